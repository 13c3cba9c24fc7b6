//! Dynamic webhook settings.
//!
//! The namespace selector applied to the resource-facing webhooks comes from
//! the `webhooks` key of the init ConfigMap, a JSON array of
//! [`WebhookSettings`]. Only the first entry's namespace selector is used.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::client::{ClusterClient, ResourceKey, ResourceKind, from_dynamic};
use crate::controller::error::Result;
use crate::controller::update::UpdateNotifier;

/// ConfigMap key holding the webhook settings
pub const WEBHOOKS_KEY: &str = "webhooks";

/// Selectors for one webhook entry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_selector: Option<LabelSelector>,
}

/// Supplies the current webhook settings, if any are configured
#[cfg_attr(test, automock)]
pub trait ConfigProvider: Send + Sync {
    fn webhooks(&self) -> Option<Vec<WebhookSettings>>;
}

/// Namespace selector to apply: the first entry's, or none.
///
/// Absent settings clear the selector on the live registrations.
pub fn selected_namespace_selector(provider: &dyn ConfigProvider) -> Option<LabelSelector> {
    provider
        .webhooks()
        .and_then(|webhooks| webhooks.into_iter().next())
        .and_then(|settings| settings.namespace_selector)
}

/// Parse the raw `webhooks` value
pub fn parse_webhooks(raw: &str) -> Result<Vec<WebhookSettings>> {
    Ok(serde_json::from_str(raw)?)
}

/// Extract webhook settings from a ConfigMap.
///
/// A missing key yields `Ok(None)`.
pub fn webhooks_from_config_map(config_map: &ConfigMap) -> Result<Option<Vec<WebhookSettings>>> {
    config_map
        .data
        .as_ref()
        .and_then(|data: &BTreeMap<String, String>| data.get(WEBHOOKS_KEY))
        .map(|raw| parse_webhooks(raw))
        .transpose()
}

/// [`ConfigProvider`] backed by the init ConfigMap
#[derive(Debug, Default)]
pub struct ConfigMapSettings {
    webhooks: RwLock<Option<Vec<WebhookSettings>>>,
}

impl ConfigProvider for ConfigMapSettings {
    fn webhooks(&self) -> Option<Vec<WebhookSettings>> {
        match self.webhooks.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ConfigMapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the settings from a ConfigMap and report whether they changed.
    ///
    /// Unparseable settings are logged and leave the stored value untouched.
    pub fn apply(&self, config_map: &ConfigMap) -> bool {
        let parsed = match webhooks_from_config_map(config_map) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Ignoring invalid webhook settings");
                return false;
            }
        };

        let mut guard = match self.webhooks.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard == parsed {
            return false;
        }
        *guard = parsed;
        true
    }

    /// Watch the named ConfigMap and notify the update loop on every change.
    ///
    /// Runs until the notifier's queue is gone.
    pub async fn watch(
        self: Arc<Self>,
        client: Client,
        namespace: String,
        name: String,
        notifier: UpdateNotifier,
    ) {
        let api: Api<ConfigMap> = Api::namespaced(client, &namespace);
        let config = WatcherConfig::default().fields(&format!("metadata.name={}", name));
        let mut stream = watcher(api, config).default_backoff().applied_objects().boxed();

        info!(namespace, name, "Watching webhook settings");
        while let Some(event) = stream.next().await {
            match event {
                Ok(config_map) => {
                    if !self.apply(&config_map) {
                        debug!(name, "Webhook settings unchanged");
                        continue;
                    }
                    info!(name, "Webhook settings changed");
                    if let Err(e) = notifier.notify().await {
                        warn!(error = %e, "Stopping webhook settings watch");
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "Webhook settings watch error"),
            }
        }
    }
}

/// Check that the init ConfigMap's webhook settings parse.
///
/// A ConfigMap that cannot be fetched is logged and accepted; malformed
/// JSON is a serialization error.
pub async fn validate_webhook_settings(
    client: &dyn ClusterClient,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let key = ResourceKey::namespaced(ResourceKind::CONFIG_MAP, namespace, name);
    let obj = match client.get(&key).await {
        Ok(obj) => obj,
        Err(e) => {
            warn!(namespace, name, error = %e, "Unable to fetch webhook settings, skipping validation");
            return Ok(());
        }
    };

    let config_map: ConfigMap = from_dynamic(obj)?;
    webhooks_from_config_map(&config_map).map(|_| ())
}
