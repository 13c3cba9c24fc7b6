//! Registration lifecycle for the five admission webhook configurations.
//!
//! The registrar owns three paths over the role descriptor table:
//! - Full reconciliation: readiness gate, teardown, then create every role
//! - Concurrent teardown: one delete task per role, joined before returning
//! - Health check: every current-mode registration must exist
//!
//! All three resolve names through the addressing mode fixed in the
//! [`Context`], so a single call never touches both name variants of a role.

use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::{Endpoints, Pod};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::client::{CacheLookup, ResourceKey, ResourceKind, from_dynamic};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result, RoleFailure};
use crate::resources::common::pod_label_selector;
use crate::resources::role::{AddressingMode, Role};
use crate::resources::webhooks::build_configuration;

/// Manages the admission webhook registrations of one webhook server
#[derive(Clone)]
pub struct Registrar {
    ctx: Arc<Context>,
}

impl Registrar {
    pub fn new(ctx: Context) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn mode(&self) -> &AddressingMode {
        &self.ctx.mode
    }

    /// Registration name of a role in the current addressing mode
    pub fn configuration_name(&self, role: Role) -> &'static str {
        role.descriptor().name(&self.ctx.mode)
    }

    /// Per-call timeout the API server applies to every webhook
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.ctx.timeout_seconds).unwrap_or_default())
    }

    /// Run a full reconciliation of all five registrations.
    ///
    /// Existing registrations are always removed first. An empty CA bundle
    /// aborts before any create; per-role create failures are collected into
    /// one [`Error::Registration`]. The pass duration is recorded whatever
    /// the outcome.
    pub async fn register(&self) -> Result<()> {
        let start = Instant::now();
        let result = self.run_registration().await;
        let elapsed = start.elapsed();

        if let Some(health) = &self.ctx.health_state {
            health.metrics.record_register(elapsed.as_secs_f64());
            if result.is_ok() {
                health.touch_last_register();
            }
        }

        if result.is_ok() {
            info!(elapsed_ms = elapsed.as_millis() as u64, "Registered all webhook configurations");
        }
        result
    }

    async fn run_registration(&self) -> Result<()> {
        if let AddressingMode::Debug { server_address } = &self.ctx.mode {
            info!(
                server_address,
                "Registering webhooks with an external server address"
            );
        } else {
            self.check_endpoint().await?;
        }

        self.remove_webhook_configurations().await;

        let ca_bundle = self.ctx.ca_source.ca_bundle().await;
        if ca_bundle.is_empty() {
            return Err(Error::ConfigurationMissing(
                "CA bundle is empty, refusing to register webhooks".to_string(),
            ));
        }

        let mut failures = Vec::new();
        for role in Role::ALL {
            if let Err(error) = self.create_configuration(role, &ca_bundle).await {
                error!(role = %role, error = %error, "Failed to create webhook configuration");
                failures.push(RoleFailure { role, error });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Registration(failures))
        }
    }

    /// Create one role's registration; an existing one counts as created
    pub async fn create_configuration(&self, role: Role, ca_bundle: &[u8]) -> Result<()> {
        let config = build_configuration(role, &self.ctx.mode, ca_bundle, self.ctx.timeout_seconds);
        let kind = config.kind();
        let obj = config.to_dynamic()?;

        let result = match self.ctx.client.create(kind.into(), &obj).await {
            Ok(_) => {
                info!(kind = %kind, name = config.name(), "Created webhook configuration");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(kind = %kind, name = config.name(), "Webhook configuration already exists");
                Ok(())
            }
            Err(e) => Err(e),
        };

        if let Some(health) = &self.ctx.health_state {
            health.metrics.record_create(&role.to_string(), result.is_ok());
        }
        result
    }

    /// Remove all five registrations concurrently.
    ///
    /// Returns once every delete has been attempted. Failures are logged and
    /// never reach the caller.
    pub async fn remove_webhook_configurations(&self) {
        let start = Instant::now();
        let mut tasks = JoinSet::new();

        for role in Role::ALL {
            let registrar = self.clone();
            tasks.spawn(async move { registrar.remove_configuration(role).await });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Webhook configuration removal task failed");
            }
        }

        if let Some(health) = &self.ctx.health_state {
            health.metrics.record_teardown();
        }
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Finished removing webhook configurations"
        );
    }

    /// Delete one role's registration; absence counts as success
    pub async fn remove_configuration(&self, role: Role) {
        let kind = role.kind();
        let name = self.configuration_name(role);

        if let Some(cache) = &self.ctx.cache
            && cache.lookup(kind, name) == CacheLookup::Absent
        {
            debug!(kind = %kind, name, "Webhook configuration not cached, skipping delete");
            return;
        }

        match self
            .ctx
            .client
            .delete(&ResourceKey::cluster(kind.into(), name))
            .await
        {
            Ok(()) => info!(kind = %kind, name, "Deleted webhook configuration"),
            Err(e) if e.is_not_found() => {
                debug!(kind = %kind, name, "Webhook configuration already removed");
            }
            Err(e) => {
                error!(kind = %kind, name, error = %e, "Failed to delete webhook configuration");
            }
        }
    }

    /// Verify every current-mode registration exists.
    ///
    /// The cache answers when it can; otherwise the cluster is asked.
    pub async fn check(&self) -> Result<()> {
        for role in Role::ALL {
            let kind = role.kind();
            let name = self.configuration_name(role);

            let lookup = self
                .ctx
                .cache
                .as_ref()
                .map_or(CacheLookup::Unknown, |cache| cache.lookup(kind, name));

            match lookup {
                CacheLookup::Present => {}
                CacheLookup::Absent => {
                    return Err(Error::NotFound {
                        kind: kind.to_string(),
                        name: name.to_string(),
                    });
                }
                CacheLookup::Unknown => {
                    self.ctx
                        .client
                        .get(&ResourceKey::cluster(kind.into(), name))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Readiness gate: the webhook pod's IP must be in the service endpoints.
    ///
    /// On any failure the existing registrations are removed before the
    /// error is returned, so the API server never calls an unreachable
    /// service.
    pub async fn check_endpoint(&self) -> Result<()> {
        match self.endpoint_ready().await {
            Ok(()) => Ok(()),
            Err(reason) => {
                warn!(reason, "Webhook endpoint not ready, removing webhook configurations");
                self.remove_webhook_configurations().await;
                Err(Error::NotReady(reason))
            }
        }
    }

    async fn endpoint_ready(&self) -> std::result::Result<(), String> {
        let namespace = self.ctx.namespace.as_str();

        // Takes the first matching pod; only correct with a single replica.
        let pods = self
            .ctx
            .client
            .list(ResourceKind::POD, Some(namespace), &pod_label_selector())
            .await
            .map_err(|e| format!("failed to list webhook pods: {}", e))?;
        let first = pods
            .into_iter()
            .next()
            .ok_or_else(|| format!("no pod matches {}", pod_label_selector()))?;
        let pod: Pod = from_dynamic(first).map_err(|e| e.to_string())?;

        let pod_ip = pod
            .status
            .and_then(|status| status.pod_ip)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| "pod IP is not assigned yet".to_string())?;

        let key = ResourceKey::namespaced(
            ResourceKind::ENDPOINTS,
            namespace,
            self.ctx.service_name.as_str(),
        );
        let endpoints: Endpoints = self
            .ctx
            .client
            .get(&key)
            .await
            .and_then(from_dynamic)
            .map_err(|e| format!("failed to get endpoints {}/{}: {}", namespace, key.name, e))?;

        let registered = endpoints.subsets.iter().flatten().any(|subset| {
            subset
                .addresses
                .iter()
                .flatten()
                .any(|address| address.ip == pod_ip)
        });

        if registered {
            debug!(pod_ip, "Webhook pod registered in service endpoints");
            Ok(())
        } else {
            Err(format!(
                "pod IP {} is not in endpoints {}/{}",
                pod_ip, namespace, key.name
            ))
        }
    }
}
