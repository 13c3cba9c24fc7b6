//! Dynamic namespace selector updates.
//!
//! A single long-lived task drains an owned work queue. Each request patches
//! rule 0 of one or both resource-facing registrations in place. A failed
//! role is resubmitted from a detached task, so the loop's only suspension
//! point is its receive and retries are unbounded with no backoff.

use std::sync::Arc;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::{ResourceKey, ResourceKind, from_dynamic, to_dynamic};
use crate::controller::error::{Error, Result};
use crate::controller::registrar::Registrar;
use crate::controller::settings::{ConfigProvider, selected_namespace_selector};
use crate::resources::role::{Role, WebhookKind};

/// Capacity of the update channel; senders wait until the loop receives
const UPDATE_CHANNEL_CAPACITY: usize = 1;

/// A unit of work for the update loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRequest {
    /// External settings changed: resync both resource-facing roles
    Resync,
    /// A previous update of this role failed
    Retry(Role),
}

impl UpdateRequest {
    /// Roles this request patches
    pub fn targets(self) -> Vec<Role> {
        match self {
            UpdateRequest::Resync => Role::RESOURCE_FACING.to_vec(),
            UpdateRequest::Retry(role) => vec![role],
        }
    }
}

/// Producer side of the update queue
#[derive(Clone, Debug)]
pub struct UpdateNotifier {
    tx: mpsc::Sender<UpdateRequest>,
}

impl UpdateNotifier {
    /// Request a resync of both resource-facing registrations.
    ///
    /// Waits until the loop has room; notifications are never coalesced.
    pub async fn notify(&self) -> Result<()> {
        self.tx
            .send(UpdateRequest::Resync)
            .await
            .map_err(|_| Error::Transient("update loop is not running".to_string()))
    }

    /// Resubmit a failed role from a detached task
    pub fn resend(&self, role: Role) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if tx.send(UpdateRequest::Retry(role)).await.is_err() {
                debug!(role = %role, "Update loop stopped, dropping retry");
            }
        })
    }
}

/// Consumer side of the update queue.
///
/// Keeps its own notifier for resubmission, so the channel stays open for
/// as long as the queue exists.
#[derive(Debug)]
pub struct UpdateQueue {
    rx: mpsc::Receiver<UpdateRequest>,
    notifier: UpdateNotifier,
}

impl UpdateQueue {
    pub fn notifier(&self) -> UpdateNotifier {
        self.notifier.clone()
    }

    /// Wait for the next request
    pub async fn next(&mut self) -> Option<UpdateRequest> {
        self.rx.recv().await
    }
}

/// Create the update work queue
pub fn update_channel() -> (UpdateNotifier, UpdateQueue) {
    let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
    let notifier = UpdateNotifier { tx };
    (
        notifier.clone(),
        UpdateQueue {
            rx,
            notifier,
        },
    )
}

impl Registrar {
    /// Run the update loop until the queue closes, which does not happen in
    /// normal operation.
    pub async fn run_update_loop(&self, mut queue: UpdateQueue, provider: Arc<dyn ConfigProvider>) {
        let notifier = queue.notifier();
        info!("Starting webhook configuration update loop");

        while let Some(request) = queue.next().await {
            info!(request = ?request, "Received signal to update webhook configurations");
            let selector = selected_namespace_selector(provider.as_ref());

            for role in self.apply_update(request, selector.as_ref()).await {
                notifier.resend(role);
            }
        }

        error!("Update channel closed, update loop stopped");
    }

    /// Apply one request and return the roles that failed.
    ///
    /// Roles are updated independently; one failure does not skip the other.
    pub async fn apply_update(
        &self,
        request: UpdateRequest,
        selector: Option<&LabelSelector>,
    ) -> Vec<Role> {
        let mut failed = Vec::new();

        for role in request.targets() {
            if !role.is_resource_facing() {
                warn!(role = %role, "Role has no mutable namespace selector, ignoring");
                continue;
            }

            let name = self.configuration_name(role);
            let result = self.update_namespace_selector(role, selector).await;
            if let Some(health) = &self.context().health_state {
                health.metrics.record_update(&role.to_string(), result.is_ok());
                if result.is_ok() {
                    health.touch_last_register();
                }
            }

            match result {
                Ok(()) => {
                    info!(kind = %role.kind(), name, "Updated webhook configuration namespace selector");
                }
                Err(e) => {
                    error!(kind = %role.kind(), name, error = %e, "Unable to update webhook configuration");
                    failed.push(role);
                }
            }
        }

        failed
    }

    /// Fetch the live registration, set rule 0's namespace selector, and
    /// write the whole object back.
    pub async fn update_namespace_selector(
        &self,
        role: Role,
        selector: Option<&LabelSelector>,
    ) -> Result<()> {
        let kind = role.kind();
        let name = self.configuration_name(role);
        let resource_kind = ResourceKind::from(kind);
        let client = &self.context().client;

        let live = client
            .get(&ResourceKey::cluster(resource_kind, name))
            .await?;

        let patched = match kind {
            WebhookKind::Mutating => {
                let mut config: MutatingWebhookConfiguration = from_dynamic(live)?;
                let first = config
                    .webhooks
                    .as_mut()
                    .and_then(|webhooks| webhooks.first_mut())
                    .ok_or_else(|| missing_rule(kind, name))?;
                first.namespace_selector = selector.cloned();
                to_dynamic(&config)?
            }
            WebhookKind::Validating => {
                let mut config: ValidatingWebhookConfiguration = from_dynamic(live)?;
                let first = config
                    .webhooks
                    .as_mut()
                    .and_then(|webhooks| webhooks.first_mut())
                    .ok_or_else(|| missing_rule(kind, name))?;
                first.namespace_selector = selector.cloned();
                to_dynamic(&config)?
            }
        };

        client.update(resource_kind, &patched).await?;
        Ok(())
    }
}

fn missing_rule(kind: WebhookKind, name: &str) -> Error {
    Error::Validation(format!("{} {} has no webhooks", kind, name))
}
