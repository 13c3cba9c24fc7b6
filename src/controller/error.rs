//! Error types for the registrar.
//!
//! Cluster API failures are classified at the client boundary so callers can
//! treat not-found and already-exists as the expected outcomes of idempotent
//! deletes and creates.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::resources::role::Role;

/// Multiplier applied to the base retry delay for non-retryable errors
const NON_RETRYABLE_BACKOFF_FACTOR: u32 = 6;

/// Error type for registrar operations
#[derive(Error, Debug)]
pub enum Error {
    /// Unclassified Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The named object does not exist
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// The named object already exists
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    /// Required configuration (the CA bundle) is unavailable
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The webhook service endpoint has not propagated yet
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Transient error that should be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// Invalid configuration value or object shape
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// One or more roles failed to register
    #[error("{}", RegistrationFailures(.0))]
    Registration(Vec<RoleFailure>),
}

/// A single role's creation failure inside an aggregate registration error.
#[derive(Debug)]
pub struct RoleFailure {
    pub role: Role,
    pub error: Error,
}

struct RegistrationFailures<'a>(&'a [RoleFailure]);

impl fmt::Display for RegistrationFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for failure in self.0 {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{}: {}", failure.role, failure.error)?;
        }
        Ok(())
    }
}

impl Error {
    /// Classify a kube error for a get or delete of `kind/name`.
    pub fn from_kube(kind: &str, name: &str, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => Error::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            _ => Error::Kube(err),
        }
    }

    /// Classify a kube error for a create of `kind/name`.
    ///
    /// A 409 on create always means the name is taken.
    pub fn from_kube_create(kind: &str, name: &str, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 409 => Error::AlreadyExists {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            _ => Error::from_kube(kind, name, err),
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this error indicates an already-exists condition
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Transient(_) | Error::NotReady(_) => true,
            Error::Registration(failures) => failures.iter().any(|f| f.error.is_retryable()),
            Error::NotFound { .. }
            | Error::AlreadyExists { .. }
            | Error::ConfigurationMissing(_)
            | Error::Validation(_)
            | Error::Serialization(_) => false,
        }
    }

    /// Roles named by an aggregate registration error, in creation order.
    pub fn failed_roles(&self) -> Vec<Role> {
        match self {
            Error::Registration(failures) => failures.iter().map(|f| f.role).collect(),
            _ => Vec::new(),
        }
    }

    /// Delay before re-invoking reconciliation, given the base retry delay.
    ///
    /// Errors that need an operator to fix something (a missing CA bundle,
    /// invalid settings) back off six times longer than transient ones.
    pub fn retry_after(&self, base: Duration) -> Duration {
        if self.is_retryable() {
            base
        } else {
            base.saturating_mul(NON_RETRYABLE_BACKOFF_FACTOR)
        }
    }
}

/// Result type alias for registrar operations
pub type Result<T> = std::result::Result<T, Error>;
