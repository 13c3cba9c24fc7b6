//! In-memory cluster for functional tests.
//!
//! `FakeCluster` implements both external boundaries of the registrar: the
//! generic `ClusterClient` and the `WebhookCache`. It stores objects keyed by
//! (kind, namespace, name), records every call, and injects failures by name.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::DynamicObject;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Barrier;

use admission_registrar::client::{
    CacheLookup, ClusterClient, ResourceKey, ResourceKind, WebhookCache, from_dynamic,
};
use admission_registrar::config::RegistrarConfig;
use admission_registrar::controller::error::{Error, Result};
use admission_registrar::controller::{Context, Registrar};
use admission_registrar::health::HealthState;
use admission_registrar::resources::ca::StaticCaBundle;
use admission_registrar::resources::common::{
    MANAGED_BY_LABEL, MANAGED_BY_VALUE, POD_NAME_LABEL, POD_NAME_VALUE,
};
use admission_registrar::resources::role::{Role, WebhookKind};
use admission_registrar::resources::webhooks::build_configuration;

pub const NAMESPACE: &str = "kyverno";
pub const SERVICE: &str = "kyverno-svc";
pub const DEPLOYMENT: &str = "kyverno";
pub const POD_IP: &str = "10.244.0.17";
pub const CA: &[u8] = b"-----BEGIN CERTIFICATE-----fake";

type ObjectKey = (String, Option<String>, String);

/// Verb of a recorded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Delete,
}

/// One recorded client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub verb: Verb,
    pub kind: String,
    pub name: String,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<ObjectKey, DynamicObject>,
    calls: Vec<Call>,
    create_failures: HashSet<String>,
    update_failures: HashMap<String, usize>,
    get_failures: HashSet<String>,
    fail_deletes: bool,
    delete_barrier: Option<Arc<Barrier>>,
    cache_synced: bool,
}

/// In-memory `ClusterClient` and `WebhookCache`
#[derive(Default)]
pub struct FakeCluster {
    inner: Mutex<Inner>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Store an object as-is
    pub fn insert(&self, obj: DynamicObject) {
        let kind = obj.types.as_ref().unwrap().kind.clone();
        let key = (
            kind,
            obj.metadata.namespace.clone(),
            obj.metadata.name.clone().unwrap(),
        );
        self.lock().objects.insert(key, obj);
    }

    /// Store an object given as JSON
    pub fn insert_json(&self, value: serde_json::Value) {
        self.insert(serde_json::from_value(value).unwrap());
    }

    /// Fail every create of the named object
    pub fn fail_create(&self, name: &str) {
        self.lock().create_failures.insert(name.to_string());
    }

    /// Fail the next `times` updates of the named object
    pub fn fail_update(&self, name: &str, times: usize) {
        self.lock().update_failures.insert(name.to_string(), times);
    }

    /// Fail every get of the given kind
    pub fn fail_get(&self, kind: ResourceKind) {
        self.lock().get_failures.insert(kind.kind.to_string());
    }

    /// Fail every delete with a transient error
    pub fn fail_deletes(&self) {
        self.lock().fail_deletes = true;
    }

    /// Hold every delete until `parties` deletes are in flight at once
    pub fn gate_deletes(&self, parties: usize) {
        self.lock().delete_barrier = Some(Arc::new(Barrier::new(parties)));
    }

    /// Let the cache answer lookups authoritatively
    pub fn sync_cache(&self) {
        self.lock().cache_synced = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, verb: Verb) -> usize {
        self.lock().calls.iter().filter(|c| c.verb == verb).count()
    }

    pub fn count_for(&self, verb: Verb, name: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.verb == verb && c.name == name)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn contains(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> bool {
        self.lock().objects.contains_key(&(
            kind.kind.to_string(),
            namespace.map(str::to_string),
            name.to_string(),
        ))
    }

    /// Fetch a stored object as a typed value
    pub fn typed<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<T> {
        let obj = self
            .lock()
            .objects
            .get(&(
                kind.kind.to_string(),
                namespace.map(str::to_string),
                name.to_string(),
            ))
            .cloned()?;
        Some(from_dynamic(obj).unwrap())
    }

    /// Names of the stored webhook configurations of a kind
    pub fn webhook_names(&self, kind: WebhookKind) -> Vec<String> {
        let kind = ResourceKind::from(kind).kind;
        let mut names: Vec<String> = self
            .lock()
            .objects
            .keys()
            .filter(|(k, _, _)| k == kind)
            .map(|(_, _, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn webhook_count(&self) -> usize {
        self.webhook_names(WebhookKind::Mutating).len()
            + self.webhook_names(WebhookKind::Validating).len()
    }

    fn record(&self, verb: Verb, kind: ResourceKind, name: &str) {
        self.lock().calls.push(Call {
            verb,
            kind: kind.kind.to_string(),
            name: name.to_string(),
        });
    }
}

fn key_of(key: &ResourceKey) -> ObjectKey {
    (
        key.kind.kind.to_string(),
        key.namespace.clone(),
        key.name.clone(),
    )
}

fn not_found(kind: ResourceKind, name: &str) -> Error {
    Error::NotFound {
        kind: kind.kind.to_string(),
        name: name.to_string(),
    }
}

/// Equality-only label selector matching, comma separated
fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.and_then(|l| l.get(k)).is_some_and(|value| value == v),
            None => false,
        })
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get(&self, key: &ResourceKey) -> Result<DynamicObject> {
        self.record(Verb::Get, key.kind, &key.name);
        let inner = self.lock();
        if inner.get_failures.contains(key.kind.kind) {
            return Err(Error::Transient(format!("get {} refused", key.name)));
        }
        inner
            .objects
            .get(&key_of(key))
            .cloned()
            .ok_or_else(|| not_found(key.kind, &key.name))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>> {
        self.record(Verb::List, kind, label_selector);
        let inner = self.lock();
        let mut items: Vec<DynamicObject> = inner
            .objects
            .iter()
            .filter(|((k, ns, _), _)| k == kind.kind && ns.as_deref() == namespace)
            .filter(|(_, obj)| matches_selector(obj.metadata.labels.as_ref(), label_selector))
            .map(|(_, obj)| obj.clone())
            .collect();
        items.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(items)
    }

    async fn create(&self, kind: ResourceKind, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.record(Verb::Create, kind, &name);
        let mut inner = self.lock();
        if inner.create_failures.contains(&name) {
            return Err(Error::Transient(format!("create {} refused", name)));
        }
        let key = (kind.kind.to_string(), obj.metadata.namespace.clone(), name.clone());
        if inner.objects.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: kind.kind.to_string(),
                name,
            });
        }
        inner.objects.insert(key, obj.clone());
        Ok(obj.clone())
    }

    async fn update(&self, kind: ResourceKind, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.record(Verb::Update, kind, &name);
        let mut inner = self.lock();
        if let Some(remaining) = inner.update_failures.get_mut(&name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::Transient(format!("update {} refused", name)));
        }
        let key = (kind.kind.to_string(), obj.metadata.namespace.clone(), name.clone());
        if !inner.objects.contains_key(&key) {
            return Err(not_found(kind, &name));
        }
        inner.objects.insert(key, obj.clone());
        Ok(obj.clone())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        self.record(Verb::Delete, key.kind, &key.name);
        let barrier = self.lock().delete_barrier.clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        let mut inner = self.lock();
        if inner.fail_deletes {
            return Err(Error::Transient(format!("delete {} refused", key.name)));
        }
        inner
            .objects
            .remove(&key_of(key))
            .map(|_| ())
            .ok_or_else(|| not_found(key.kind, &key.name))
    }
}

impl WebhookCache for FakeCluster {
    fn lookup(&self, kind: WebhookKind, name: &str) -> CacheLookup {
        let inner = self.lock();
        if !inner.cache_synced {
            return CacheLookup::Unknown;
        }
        let key = (ResourceKind::from(kind).kind.to_string(), None, name.to_string());
        if inner.objects.contains_key(&key) {
            CacheLookup::Present
        } else {
            CacheLookup::Absent
        }
    }
}

// ============================================================================
// Seeding helpers
// ============================================================================

/// A webhook pod with the given IP, plus the service endpoints
pub fn seed_endpoint(cluster: &FakeCluster, pod_ip: Option<&str>, endpoint_ips: &[&str]) {
    cluster.insert_json(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": "kyverno-7d9f8b-abcde",
            "namespace": NAMESPACE,
            "labels": { POD_NAME_LABEL: POD_NAME_VALUE }
        },
        "status": { "podIP": pod_ip }
    }));

    let addresses: Vec<_> = endpoint_ips.iter().map(|ip| json!({ "ip": ip })).collect();
    cluster.insert_json(json!({
        "apiVersion": "v1",
        "kind": "Endpoints",
        "metadata": { "name": SERVICE, "namespace": NAMESPACE },
        "subsets": [{ "addresses": addresses, "ports": [{ "port": 9443 }] }]
    }));
}

/// A ready webhook pod registered in the service endpoints
pub fn seed_ready_endpoint(cluster: &FakeCluster) {
    seed_endpoint(cluster, Some(POD_IP), &[POD_IP]);
}

/// The owning deployment
pub fn seed_deployment(cluster: &FakeCluster, replicas: Option<i32>, terminating: bool) {
    let mut metadata = json!({ "name": DEPLOYMENT, "namespace": NAMESPACE });
    if terminating {
        metadata["deletionTimestamp"] = json!("2026-10-15T12:00:00Z");
    }
    let spec = match replicas {
        Some(replicas) => json!({ "replicas": replicas, "selector": {}, "template": {} }),
        None => json!({ "selector": {}, "template": {} }),
    };
    cluster.insert_json(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": metadata,
        "spec": spec
    }));
}

/// A secret, optionally carrying the managed-by label
pub fn seed_secret(cluster: &FakeCluster, name: &str, managed: bool) {
    let labels = if managed {
        json!({ MANAGED_BY_LABEL: MANAGED_BY_VALUE })
    } else {
        json!({ "app": "other" })
    };
    cluster.insert_json(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": NAMESPACE, "labels": labels }
    }));
}

/// Every registration of the current mode, as if a previous run created them
pub fn seed_registrations(cluster: &FakeCluster, registrar: &Registrar, ca: &[u8]) {
    for role in Role::ALL {
        let config = build_configuration(role, registrar.mode(), ca, 10);
        cluster.insert(config.to_dynamic().unwrap());
    }
}

// ============================================================================
// Registrar builders
// ============================================================================

pub fn standard_config() -> RegistrarConfig {
    RegistrarConfig::default()
}

pub fn debug_config() -> RegistrarConfig {
    RegistrarConfig {
        server_address: Some("192.168.1.20:9443".to_string()),
        ..Default::default()
    }
}

pub fn registrar_with(cluster: &Arc<FakeCluster>, config: &RegistrarConfig, ca: &[u8]) -> Registrar {
    let ctx = Context::new(
        cluster.clone(),
        Arc::new(StaticCaBundle(ca.to_vec())),
        config,
    );
    Registrar::new(ctx)
}

/// Registrar that reports into a fresh health state
pub fn health_registrar_with(
    cluster: &Arc<FakeCluster>,
    config: &RegistrarConfig,
    ca: &[u8],
) -> (Registrar, Arc<HealthState>) {
    let state = Arc::new(HealthState::new());
    let ctx = Context::new(
        cluster.clone(),
        Arc::new(StaticCaBundle(ca.to_vec())),
        config,
    )
    .with_health_state(state.clone());
    (Registrar::new(ctx), state)
}

/// Registrar that also consults the fake as its webhook cache
pub fn cached_registrar_with(
    cluster: &Arc<FakeCluster>,
    config: &RegistrarConfig,
    ca: &[u8],
) -> Registrar {
    let ctx = Context::new(
        cluster.clone(),
        Arc::new(StaticCaBundle(ca.to_vec())),
        config,
    )
    .with_cache(cluster.clone());
    Registrar::new(ctx)
}
