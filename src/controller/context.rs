//! Shared context for the registrar.
//!
//! Holds the external collaborators (cluster client, cache, CA source) and
//! the values resolved once at construction: addressing mode, namespace,
//! and webhook timeout.

use std::sync::Arc;

use crate::client::{ClusterClient, WebhookCache};
use crate::config::RegistrarConfig;
use crate::health::HealthState;
use crate::resources::ca::CaBundleSource;
use crate::resources::role::AddressingMode;

/// Shared context for the registrar
#[derive(Clone)]
pub struct Context {
    /// Generic cluster access
    pub client: Arc<dyn ClusterClient>,
    /// Optional existence hint for webhook configurations
    pub cache: Option<Arc<dyn WebhookCache>>,
    /// Source of the CA bundle injected into every webhook
    pub ca_source: Arc<dyn CaBundleSource>,
    /// Addressing mode, fixed for the lifetime of the registrar
    pub mode: AddressingMode,
    /// Namespace of the service, pods, deployment, and managed secrets
    pub namespace: String,
    /// Name of the webhook service
    pub service_name: String,
    /// Name of the deployment that owns the webhook server
    pub deployment_name: String,
    /// Per-call webhook timeout in seconds
    pub timeout_seconds: i32,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a new context from static configuration
    pub fn new(
        client: Arc<dyn ClusterClient>,
        ca_source: Arc<dyn CaBundleSource>,
        config: &RegistrarConfig,
    ) -> Self {
        Self {
            client,
            cache: None,
            ca_source,
            mode: config.addressing_mode(),
            namespace: config.namespace.clone(),
            service_name: config.service_name.clone(),
            deployment_name: config.deployment_name.clone(),
            timeout_seconds: config.webhook_timeout_secs,
            health_state: None,
        }
    }

    /// Attach the webhook configuration cache
    pub fn with_cache(mut self, cache: Arc<dyn WebhookCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach health state for metrics and readiness
    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }
}
