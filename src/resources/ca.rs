//! CA bundle sources.
//!
//! The bundle is issued elsewhere; the registrar only reads it. A source that
//! cannot produce a bundle returns an empty one and reconciliation refuses to
//! write anything.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

/// Default path to the mounted CA certificate
pub const DEFAULT_CA_BUNDLE_PATH: &str = "/etc/webhook/certs/ca.crt";

/// Supplies the CA bundle injected into every webhook client configuration
#[async_trait]
pub trait CaBundleSource: Send + Sync {
    /// Read the current CA bundle; empty when unavailable
    async fn ca_bundle(&self) -> Vec<u8>;
}

/// CA bundle read from a mounted PEM file
#[derive(Clone, Debug)]
pub struct FileCaBundle {
    path: PathBuf,
}

impl FileCaBundle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CaBundleSource for FileCaBundle {
    async fn ca_bundle(&self) -> Vec<u8> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read CA bundle");
                Vec::new()
            }
        }
    }
}

/// Fixed in-memory CA bundle
#[derive(Clone, Debug, Default)]
pub struct StaticCaBundle(pub Vec<u8>);

#[async_trait]
impl CaBundleSource for StaticCaBundle {
    async fn ca_bundle(&self) -> Vec<u8> {
        self.0.clone()
    }
}
