//! Cluster access boundary.
//!
//! The registrar talks to the API server only through [`ClusterClient`], a
//! generic CRUD interface keyed by (API version, kind, namespace, name).
//! Objects cross this boundary untyped as [`DynamicObject`]; everything inside
//! the registrar works on typed `k8s-openapi` structs and converts with
//! [`to_dynamic`] / [`from_dynamic`].
//!
//! ## Architecture
//!
//! - `ClusterClient`: the trait, plus `KubeClusterClient` backed by `kube::Client`
//! - `cache`: eventually-consistent lookups of the two webhook configuration kinds

pub mod cache;

use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, PostParams,
};
use kube::{Client, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::resources::role::WebhookKind;

pub use cache::{CacheLookup, ReflectorCache, WebhookCache};

/// API version and kind of a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    pub api_version: &'static str,
    pub kind: &'static str,
}

impl ResourceKind {
    pub const MUTATING_WEBHOOK_CONFIGURATION: ResourceKind = ResourceKind {
        api_version: "admissionregistration.k8s.io/v1",
        kind: "MutatingWebhookConfiguration",
    };
    pub const VALIDATING_WEBHOOK_CONFIGURATION: ResourceKind = ResourceKind {
        api_version: "admissionregistration.k8s.io/v1",
        kind: "ValidatingWebhookConfiguration",
    };
    pub const POD: ResourceKind = ResourceKind {
        api_version: "v1",
        kind: "Pod",
    };
    pub const ENDPOINTS: ResourceKind = ResourceKind {
        api_version: "v1",
        kind: "Endpoints",
    };
    pub const SECRET: ResourceKind = ResourceKind {
        api_version: "v1",
        kind: "Secret",
    };
    pub const CONFIG_MAP: ResourceKind = ResourceKind {
        api_version: "v1",
        kind: "ConfigMap",
    };
    pub const DEPLOYMENT: ResourceKind = ResourceKind {
        api_version: "apps/v1",
        kind: "Deployment",
    };

    fn group_version(&self) -> (&'static str, &'static str) {
        match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version),
        }
    }

    fn api_resource(&self) -> ApiResource {
        let (group, version) = self.group_version();
        ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, self.kind))
    }
}

impl From<WebhookKind> for ResourceKind {
    fn from(kind: WebhookKind) -> Self {
        match kind {
            WebhookKind::Mutating => ResourceKind::MUTATING_WEBHOOK_CONFIGURATION,
            WebhookKind::Validating => ResourceKind::VALIDATING_WEBHOOK_CONFIGURATION,
        }
    }
}

/// Address of a single object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceKey {
    /// Key for a cluster-scoped object
    pub fn cluster(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    /// Key for a namespaced object
    pub fn namespaced(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

/// Generic CRUD against arbitrary cluster resource kinds.
///
/// Implementations classify API failures: a missing object is
/// [`Error::NotFound`], a create that collides with an existing name is
/// [`Error::AlreadyExists`].
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch one object
    async fn get(&self, key: &ResourceKey) -> Result<DynamicObject>;

    /// List objects of a kind matching a label selector
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>>;

    /// Create an object; the namespace is taken from its metadata
    async fn create(&self, kind: ResourceKind, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Replace an existing object as a whole
    async fn update(&self, kind: ResourceKind, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Delete one object
    async fn delete(&self, key: &ResourceKey) -> Result<()>;
}

/// [`ClusterClient`] backed by a `kube::Client`
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = kind.api_resource();
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get(&self, key: &ResourceKey) -> Result<DynamicObject> {
        self.api(key.kind, key.namespace.as_deref())
            .get(&key.name)
            .await
            .map_err(|e| Error::from_kube(key.kind.kind, &key.name, e))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>> {
        let params = ListParams::default().labels(label_selector);
        let list = self.api(kind, namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create(&self, kind: ResourceKind, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.name_any();
        self.api(kind, obj.metadata.namespace.as_deref())
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| Error::from_kube_create(kind.kind, &name, e))
    }

    async fn update(&self, kind: ResourceKind, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.name_any();
        self.api(kind, obj.metadata.namespace.as_deref())
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| Error::from_kube(kind.kind, &name, e))
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        self.api(key.kind, key.namespace.as_deref())
            .delete(&key.name, &DeleteParams::default())
            .await
            .map_err(|e| Error::from_kube(key.kind.kind, &key.name, e))?;
        debug!(kind = key.kind.kind, name = %key.name, "Delete accepted");
        Ok(())
    }
}

/// Convert a typed object into its untyped form
pub fn to_dynamic<T: Serialize>(obj: &T) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Convert an untyped object into a typed one
pub fn from_dynamic<T: DeserializeOwned>(obj: DynamicObject) -> Result<T> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}
