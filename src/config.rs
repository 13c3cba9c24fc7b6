//! Static runtime configuration.
//!
//! Read once from the environment at startup. Only the CA bundle, the
//! timeout, and the namespace selector vary at runtime; everything that
//! identifies a registration is fixed in [`crate::resources::common`].

use std::time::Duration;

use tracing::warn;

use crate::controller::error::{Error, Result};
use crate::resources::ca::DEFAULT_CA_BUNDLE_PATH;
use crate::resources::common::SERVICE_PORT;
use crate::resources::role::{AddressingMode, ServiceTarget};

const DEFAULT_NAMESPACE: &str = "kyverno";
const DEFAULT_SERVICE_NAME: &str = "kyverno-svc";
const DEFAULT_DEPLOYMENT_NAME: &str = "kyverno";
const DEFAULT_INIT_CONFIG: &str = "init-config";
const DEFAULT_WEBHOOK_TIMEOUT_SECS: i32 = 10;
const DEFAULT_HEALTH_PORT: u16 = 8080;
const DEFAULT_REGISTER_RETRY_SECS: u64 = 5;

/// The API server rejects webhook timeouts above this
pub const MAX_WEBHOOK_TIMEOUT_SECS: i32 = 30;

/// Registrar configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrarConfig {
    /// Namespace of the webhook service, pods, deployment, and managed secrets
    pub namespace: String,
    /// Name of the webhook service
    pub service_name: String,
    /// Name of the deployment that owns the webhook server
    pub deployment_name: String,
    /// External address of an out-of-cluster webhook server
    pub server_address: Option<String>,
    /// Per-call webhook timeout in seconds
    pub webhook_timeout_secs: i32,
    /// Path to the mounted CA certificate
    pub ca_bundle_path: String,
    /// ConfigMap holding the dynamic webhook settings
    pub init_config: String,
    /// Port of the health server
    pub health_port: u16,
    /// Delay between registration attempts
    pub register_retry: Duration,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            server_address: None,
            webhook_timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
            ca_bundle_path: DEFAULT_CA_BUNDLE_PATH.to_string(),
            init_config: DEFAULT_INIT_CONFIG.to_string(),
            health_port: DEFAULT_HEALTH_PORT,
            register_retry: Duration::from_secs(DEFAULT_REGISTER_RETRY_SECS),
        }
    }
}

impl RegistrarConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let namespace = lookup("POD_NAMESPACE").unwrap_or_else(|| {
            warn!("POD_NAMESPACE not set, using '{}'", DEFAULT_NAMESPACE);
            defaults.namespace.clone()
        });

        let webhook_timeout_secs = match lookup("WEBHOOK_TIMEOUT") {
            Some(raw) => parse_timeout(&raw)?,
            None => defaults.webhook_timeout_secs,
        };

        let health_port = match lookup("HEALTH_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Validation(format!("invalid HEALTH_PORT: {}", raw)))?,
            None => defaults.health_port,
        };

        let register_retry = match lookup("REGISTER_RETRY_SECS") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                Error::Validation(format!("invalid REGISTER_RETRY_SECS: {}", raw))
            })?),
            None => defaults.register_retry,
        };

        Ok(Self {
            namespace,
            service_name: lookup("SERVICE_NAME").unwrap_or(defaults.service_name),
            deployment_name: lookup("DEPLOYMENT_NAME").unwrap_or(defaults.deployment_name),
            server_address: lookup("SERVER_IP").filter(|ip| !ip.trim().is_empty()),
            webhook_timeout_secs,
            ca_bundle_path: lookup("CA_BUNDLE_PATH").unwrap_or(defaults.ca_bundle_path),
            init_config: lookup("INIT_CONFIG").unwrap_or(defaults.init_config),
            health_port,
            register_retry,
        })
    }

    /// Resolve the addressing mode once; a server address selects debug mode
    pub fn addressing_mode(&self) -> AddressingMode {
        match &self.server_address {
            Some(server_address) => AddressingMode::Debug {
                server_address: server_address.clone(),
            },
            None => AddressingMode::Standard(ServiceTarget {
                namespace: self.namespace.clone(),
                name: self.service_name.clone(),
                port: SERVICE_PORT,
            }),
        }
    }
}

fn parse_timeout(raw: &str) -> Result<i32> {
    let secs: i32 = raw
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("invalid WEBHOOK_TIMEOUT: {}", raw)))?;
    if !(1..=MAX_WEBHOOK_TIMEOUT_SECS).contains(&secs) {
        return Err(Error::Validation(format!(
            "WEBHOOK_TIMEOUT must be between 1 and {}, got {}",
            MAX_WEBHOOK_TIMEOUT_SECS, secs
        )));
    }
    Ok(secs)
}
