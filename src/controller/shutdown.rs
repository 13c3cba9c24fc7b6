//! Liveness-gated teardown on process shutdown.
//!
//! A terminating pod only removes the registrations when the owning
//! deployment is going away as well: rolling restarts and scale-downs to a
//! non-zero replica count leave them in place for the surviving pods.

use k8s_openapi::api::apps::v1::Deployment;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::client::{ResourceKey, ResourceKind};
use crate::controller::error::Result;
use crate::controller::registrar::Registrar;
use crate::resources::common::managed_secret_selector;

/// Fires a one-shot completion signal when dropped.
///
/// Sends at most once whichever way the owning operation exits.
#[derive(Debug)]
pub struct CompletionSignal {
    done: Option<oneshot::Sender<()>>,
}

impl CompletionSignal {
    pub fn new(done: oneshot::Sender<()>) -> Self {
        Self { done: Some(done) }
    }

    /// Fire now instead of on drop
    pub fn complete(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(done) = self.done.take() {
            // The receiver may have stopped waiting
            let _ = done.send(());
        }
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        self.fire();
    }
}

impl Registrar {
    /// Remove the registrations and managed secrets if the deployment is
    /// being deleted or scaled to zero, then signal `done`.
    pub async fn remove(&self, done: oneshot::Sender<()>) {
        let signal = CompletionSignal::new(done);

        if self.should_clean_up().await {
            info!("Removing webhook configurations and managed secrets");
            self.remove_webhook_configurations().await;
            self.remove_secrets().await;
        } else {
            info!("Deployment is still running, keeping webhook configurations");
        }

        signal.complete();
    }

    /// Liveness probe over the owning deployment.
    ///
    /// A deployment that cannot be read is treated as gone.
    pub async fn should_clean_up(&self) -> bool {
        let ctx = self.context();
        let key = ResourceKey::namespaced(
            ResourceKind::DEPLOYMENT,
            ctx.namespace.as_str(),
            ctx.deployment_name.as_str(),
        );

        let deployment: Deployment = match self.fetch(&key).await {
            Ok(deployment) => deployment,
            Err(e) => {
                warn!(
                    namespace = %ctx.namespace,
                    name = %ctx.deployment_name,
                    error = %e,
                    "Unable to read deployment, cleaning up"
                );
                return true;
            }
        };

        if deployment.metadata.deletion_timestamp.is_some() {
            debug!(name = %ctx.deployment_name, "Deployment is terminating");
            return true;
        }

        let replicas = deployment
            .spec
            .and_then(|spec| spec.replicas)
            .unwrap_or_default();
        debug!(name = %ctx.deployment_name, replicas, "Deployment replica count");
        replicas == 0
    }

    /// Delete every secret carrying the managed-by label
    pub async fn remove_secrets(&self) {
        let ctx = self.context();
        let selector = managed_secret_selector();

        let secrets = match ctx
            .client
            .list(ResourceKind::SECRET, Some(ctx.namespace.as_str()), &selector)
            .await
        {
            Ok(secrets) => secrets,
            Err(e) => {
                error!(selector, error = %e, "Failed to list managed secrets");
                return;
            }
        };

        for secret in secrets {
            let Some(name) = secret.metadata.name else {
                continue;
            };
            let key = ResourceKey::namespaced(ResourceKind::SECRET, ctx.namespace.as_str(), name);
            match ctx.client.delete(&key).await {
                Ok(()) => info!(name = %key.name, "Deleted managed secret"),
                Err(e) if e.is_not_found() => {
                    debug!(name = %key.name, "Managed secret already removed");
                }
                Err(e) => error!(name = %key.name, error = %e, "Failed to delete managed secret"),
            }
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, key: &ResourceKey) -> Result<T> {
        let obj = self.context().client.get(key).await?;
        crate::client::from_dynamic(obj)
    }
}
