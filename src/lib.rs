//! admission-registrar library crate
//!
//! This module exports the registrar, its cluster boundary, and the
//! configuration builders for the admission webhook registrations.

pub mod client;
pub mod config;
pub mod controller;
pub mod health;
pub mod resources;

pub use config::RegistrarConfig;
pub use controller::{Error, Registrar, Result};
pub use health::HealthState;

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use controller::settings::{ConfigMapSettings, ConfigProvider};
use controller::update::{UpdateNotifier, UpdateQueue};

/// Run full reconciliation until it succeeds.
///
/// Retryable failures wait `retry` before the next attempt; the rest wait
/// [`Error::retry_after`]. Marks the health state ready on success. Never
/// returns an error: the caller bounds it by racing it against shutdown.
pub async fn register_with_retry(
    registrar: &Registrar,
    retry: Duration,
    health_state: Option<Arc<HealthState>>,
) {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let delay = match registrar.register().await {
            Ok(()) => {
                info!(attempt, "Webhook configurations registered");
                if let Some(state) = health_state {
                    state.set_ready(true).await;
                }
                return;
            }
            Err(e @ Error::NotReady(_)) => {
                info!(attempt, error = %e, "Webhook endpoint not ready, retrying");
                e.retry_after(retry)
            }
            Err(e) => {
                let delay = e.retry_after(retry);
                warn!(
                    attempt,
                    error = %e,
                    retry_secs = delay.as_secs(),
                    "Failed to register webhook configurations, retrying"
                );
                delay
            }
        };
        tokio::time::sleep(delay).await;
    }
}

/// Spawn the dynamic update loop on the current runtime
pub fn spawn_update_loop(
    registrar: Registrar,
    queue: UpdateQueue,
    provider: Arc<dyn ConfigProvider>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        registrar.run_update_loop(queue, provider).await;
    })
}

/// Start watching the init ConfigMap and return the settings it feeds.
///
/// Every change to the parsed settings sends one resync to `notifier`.
pub fn spawn_settings_watch(
    client: Client,
    config: &RegistrarConfig,
    notifier: UpdateNotifier,
) -> (Arc<ConfigMapSettings>, JoinHandle<()>) {
    let settings = Arc::new(ConfigMapSettings::new());
    let watch = settings.clone();
    let namespace = config.namespace.clone();
    let name = config.init_config.clone();

    let handle = tokio::spawn(async move {
        watch.watch(client, namespace, name, notifier).await;
        // This should never complete in normal operation
        error!("Webhook settings watch ended unexpectedly");
    });

    (settings, handle)
}
