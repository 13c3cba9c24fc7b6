//! Eventually-consistent cache of webhook configurations.
//!
//! The cache is a hint, not a source of truth: teardown uses it to skip
//! deletes of objects it has never seen, and the health check uses it to
//! avoid hitting the API server on every probe.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Api, Client};
use tracing::{debug, warn};

use crate::resources::role::WebhookKind;

/// Result of a cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// The object is in the cache
    Present,
    /// The cache is synced and does not hold the object
    Absent,
    /// The cache cannot answer yet
    Unknown,
}

/// Read-only lookup of webhook configurations by kind and name.
///
/// Must be safe for concurrent reads; the registrar never writes to it.
pub trait WebhookCache: Send + Sync {
    fn lookup(&self, kind: WebhookKind, name: &str) -> CacheLookup;
}

/// [`WebhookCache`] fed by two reflectors
#[derive(Clone)]
pub struct ReflectorCache {
    mutating: Store<MutatingWebhookConfiguration>,
    validating: Store<ValidatingWebhookConfiguration>,
    mutating_synced: Arc<AtomicBool>,
    validating_synced: Arc<AtomicBool>,
}

impl ReflectorCache {
    /// Start reflectors for both configuration kinds on the current runtime.
    pub fn spawn(client: Client) -> Self {
        let mutating_synced = Arc::new(AtomicBool::new(false));
        let validating_synced = Arc::new(AtomicBool::new(false));

        let mutating = spawn_reflector::<MutatingWebhookConfiguration>(
            Api::all(client.clone()),
            mutating_synced.clone(),
        );
        let validating = spawn_reflector::<ValidatingWebhookConfiguration>(
            Api::all(client),
            validating_synced.clone(),
        );

        Self {
            mutating,
            validating,
            mutating_synced,
            validating_synced,
        }
    }
}

impl WebhookCache for ReflectorCache {
    fn lookup(&self, kind: WebhookKind, name: &str) -> CacheLookup {
        let (synced, present) = match kind {
            WebhookKind::Mutating => (
                self.mutating_synced.load(Ordering::Acquire),
                self.mutating.get(&ObjectRef::new(name)).is_some(),
            ),
            WebhookKind::Validating => (
                self.validating_synced.load(Ordering::Acquire),
                self.validating.get(&ObjectRef::new(name)).is_some(),
            ),
        };

        match (present, synced) {
            (true, _) => CacheLookup::Present,
            (false, true) => CacheLookup::Absent,
            (false, false) => CacheLookup::Unknown,
        }
    }
}

fn spawn_reflector<K>(api: Api<K>, synced: Arc<AtomicBool>) -> Store<K>
where
    K: kube::Resource<DynamicType = ()>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug
        + Send
        + Sync
        + 'static,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, WatcherConfig::default().any_semantic()))
        .default_backoff()
        .touched_objects();

    tokio::spawn(async move {
        stream
            .for_each(|event| async move {
                if let Err(e) = event {
                    warn!(error = %e, "Webhook configuration watch error");
                }
            })
            .await;
    });

    let ready = reader.clone();
    tokio::spawn(async move {
        if ready.wait_until_ready().await.is_ok() {
            synced.store(true, Ordering::Release);
            debug!(kind = %K::kind(&()), "Webhook configuration cache synced");
        }
    });

    reader
}
