//! admission-registrar - registers the admission webhooks of a policy engine.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Starts the health server
//! - Registers the webhook configurations once the endpoint is ready
//! - Runs the namespace selector update loop
//! - Removes the registrations on shutdown when the deployment is going away

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info};

use admission_registrar::client::{KubeClusterClient, ReflectorCache};
use admission_registrar::controller::settings::validate_webhook_settings;
use admission_registrar::controller::{Context, update_channel};
use admission_registrar::health::{HealthState, run_health_server};
use admission_registrar::resources::ca::FileCaBundle;
use admission_registrar::{
    Registrar, RegistrarConfig, register_with_retry, spawn_settings_watch, spawn_update_loop,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("admission_registrar=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting admission-registrar");

    let config = RegistrarConfig::from_env()?;
    info!(
        namespace = %config.namespace,
        service = %config.service_name,
        debug = config.server_address.is_some(),
        timeout_secs = config.webhook_timeout_secs,
        "Loaded configuration"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately so liveness probes pass while waiting
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let cluster = Arc::new(KubeClusterClient::new(client.clone()));
    validate_webhook_settings(cluster.as_ref(), &config.namespace, &config.init_config).await?;

    let cache = Arc::new(ReflectorCache::spawn(client.clone()));
    let ctx = Context::new(
        cluster,
        Arc::new(FileCaBundle::new(&config.ca_bundle_path)),
        &config,
    )
    .with_cache(cache)
    .with_health_state(health_state.clone());
    let registrar = Registrar::new(ctx);

    let (notifier, queue) = update_channel();
    let (settings, settings_handle) = spawn_settings_watch(client, &config, notifier);

    // Register before starting the update loop; abort the wait on shutdown
    let registered = tokio::select! {
        _ = register_with_retry(&registrar, config.register_retry, Some(health_state.clone())) => true,
        _ = shutdown_signal() => {
            info!("Received shutdown signal before registration completed");
            false
        }
    };

    if registered {
        let update_handle = spawn_update_loop(registrar.clone(), queue, settings);

        // Wait for any task to complete (or fail), or shutdown signal
        tokio::select! {
            result = update_handle => {
                if let Err(e) = result {
                    error!("Update loop task panicked: {}", e);
                }
            }
            result = health_handle => {
                if let Err(e) = result {
                    error!("Health server task panicked: {}", e);
                }
            }
            result = settings_handle => {
                if let Err(e) = result {
                    error!("Settings watch task panicked: {}", e);
                }
            }
            // Handle graceful shutdown on SIGTERM or SIGINT
            _ = shutdown_signal() => {
                info!("Received shutdown signal, initiating graceful shutdown...");
            }
        }
    }

    // Mark as not ready to stop receiving new traffic
    health_state.set_ready(false).await;
    info!("Marked registrar as not ready");

    let (done_tx, done_rx) = oneshot::channel();
    registrar.remove(done_tx).await;
    if done_rx.await.is_err() {
        error!("Shutdown completion signal dropped");
    }

    info!("Registrar stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the registrar cannot shut
/// down gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
