//! Admission webhook configuration builders.
//!
//! Pure functions: the same role, mode, CA bundle, and timeout always
//! produce the same object.

use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;

use super::common::standard_labels;
use super::role::{AddressingMode, MatchRule, Role, RoleDescriptor, WebhookKind};
use crate::client::to_dynamic;
use crate::controller::error::Result;

/// Admission review versions the webhook server understands
const ADMISSION_REVIEW_VERSIONS: [&str; 2] = ["v1", "v1beta1"];

/// A desired registration of either kind
#[derive(Clone, Debug, PartialEq)]
pub enum WebhookConfiguration {
    Mutating(MutatingWebhookConfiguration),
    Validating(ValidatingWebhookConfiguration),
}

impl WebhookConfiguration {
    pub fn kind(&self) -> WebhookKind {
        match self {
            WebhookConfiguration::Mutating(_) => WebhookKind::Mutating,
            WebhookConfiguration::Validating(_) => WebhookKind::Validating,
        }
    }

    pub fn name(&self) -> &str {
        let meta = match self {
            WebhookConfiguration::Mutating(c) => &c.metadata,
            WebhookConfiguration::Validating(c) => &c.metadata,
        };
        meta.name.as_deref().unwrap_or_default()
    }

    /// Client configurations of every rule, in order
    pub fn client_configs(&self) -> Vec<&WebhookClientConfig> {
        match self {
            WebhookConfiguration::Mutating(c) => c
                .webhooks
                .iter()
                .flatten()
                .map(|w| &w.client_config)
                .collect(),
            WebhookConfiguration::Validating(c) => c
                .webhooks
                .iter()
                .flatten()
                .map(|w| &w.client_config)
                .collect(),
        }
    }

    /// Convert to the untyped form the cluster client accepts
    pub fn to_dynamic(&self) -> Result<DynamicObject> {
        match self {
            WebhookConfiguration::Mutating(c) => to_dynamic(c),
            WebhookConfiguration::Validating(c) => to_dynamic(c),
        }
    }
}

/// Build the desired registration for `role` in the given addressing mode.
pub fn build_configuration(
    role: Role,
    mode: &AddressingMode,
    ca_bundle: &[u8],
    timeout_seconds: i32,
) -> WebhookConfiguration {
    let desc = role.descriptor();
    let metadata = ObjectMeta {
        name: Some(desc.name(mode).to_string()),
        labels: Some(standard_labels()),
        ..Default::default()
    };
    let client_config = client_config(mode, desc.path, ca_bundle);

    match desc.kind {
        WebhookKind::Mutating => {
            WebhookConfiguration::Mutating(MutatingWebhookConfiguration {
                metadata,
                webhooks: Some(vec![mutating_webhook(desc, client_config, timeout_seconds)]),
            })
        }
        WebhookKind::Validating => {
            WebhookConfiguration::Validating(ValidatingWebhookConfiguration {
                metadata,
                webhooks: Some(vec![validating_webhook(
                    desc,
                    client_config,
                    timeout_seconds,
                )]),
            })
        }
    }
}

/// Build the client configuration for a service path.
///
/// Standard mode references the in-cluster service; debug mode points the API
/// server at the external address instead.
pub fn client_config(mode: &AddressingMode, path: &str, ca_bundle: &[u8]) -> WebhookClientConfig {
    let ca_bundle = Some(ByteString(ca_bundle.to_vec()));
    match mode {
        AddressingMode::Standard(target) => WebhookClientConfig {
            ca_bundle,
            service: Some(ServiceReference {
                namespace: target.namespace.clone(),
                name: target.name.clone(),
                path: Some(path.to_string()),
                port: Some(target.port),
            }),
            url: None,
        },
        AddressingMode::Debug { .. } => WebhookClientConfig {
            ca_bundle,
            service: None,
            url: mode.url_for(path),
        },
    }
}

fn rules(rule: &MatchRule) -> Vec<RuleWithOperations> {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    vec![RuleWithOperations {
        api_groups: Some(owned(rule.api_groups)),
        api_versions: Some(owned(rule.api_versions)),
        operations: Some(owned(rule.operations)),
        resources: Some(owned(rule.resources)),
        scope: None,
    }]
}

fn review_versions() -> Vec<String> {
    ADMISSION_REVIEW_VERSIONS
        .iter()
        .map(|v| v.to_string())
        .collect()
}

fn mutating_webhook(
    desc: &RoleDescriptor,
    client_config: WebhookClientConfig,
    timeout_seconds: i32,
) -> MutatingWebhook {
    MutatingWebhook {
        name: desc.webhook_name.to_string(),
        admission_review_versions: review_versions(),
        client_config,
        failure_policy: Some(desc.failure_policy.to_string()),
        side_effects: desc.side_effects.to_string(),
        timeout_seconds: Some(timeout_seconds),
        rules: Some(rules(&desc.rule)),
        ..Default::default()
    }
}

fn validating_webhook(
    desc: &RoleDescriptor,
    client_config: WebhookClientConfig,
    timeout_seconds: i32,
) -> ValidatingWebhook {
    ValidatingWebhook {
        name: desc.webhook_name.to_string(),
        admission_review_versions: review_versions(),
        client_config,
        failure_policy: Some(desc.failure_policy.to_string()),
        side_effects: desc.side_effects.to_string(),
        timeout_seconds: Some(timeout_seconds),
        rules: Some(rules(&desc.rule)),
        ..Default::default()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use crate::resources::common::*;
    use crate::resources::role::ServiceTarget;

    const CA: &[u8] = b"-----BEGIN CERTIFICATE-----test";

    fn standard() -> AddressingMode {
        AddressingMode::Standard(ServiceTarget {
            namespace: "kyverno".to_string(),
            name: "kyverno-svc".to_string(),
            port: SERVICE_PORT,
        })
    }

    fn debug() -> AddressingMode {
        AddressingMode::Debug {
            server_address: "192.168.1.20:9443".to_string(),
        }
    }

    #[test]
    fn test_standard_uses_service_reference() {
        for role in Role::ALL {
            let cfg = build_configuration(role, &standard(), CA, 10);
            for client in cfg.client_configs() {
                assert!(client.url.is_none());
                let svc = client.service.as_ref().unwrap();
                assert_eq!(svc.namespace, "kyverno");
                assert_eq!(svc.name, "kyverno-svc");
                assert_eq!(svc.port, Some(443));
                assert_eq!(svc.path.as_deref(), Some(role.descriptor().path));
                assert_eq!(client.ca_bundle.as_ref().unwrap().0, CA.to_vec());
            }
        }
    }

    #[test]
    fn test_debug_uses_external_url() {
        for role in Role::ALL {
            let cfg = build_configuration(role, &debug(), CA, 10);
            assert_eq!(cfg.name(), role.descriptor().debug_name);
            for client in cfg.client_configs() {
                assert!(client.service.is_none());
                assert_eq!(
                    client.url.as_deref(),
                    Some(format!("https://192.168.1.20:9443{}", role.descriptor().path).as_str())
                );
            }
        }
    }

    #[test]
    fn test_kind_matches_descriptor() {
        for role in Role::ALL {
            assert_eq!(build_configuration(role, &standard(), CA, 10).kind(), role.kind());
        }
    }

    #[test]
    fn test_resource_mutating_configuration() {
        let cfg = build_configuration(Role::ResourceMutation, &standard(), CA, 7);
        let WebhookConfiguration::Mutating(cfg) = cfg else {
            panic!("expected a mutating configuration");
        };
        assert_eq!(
            cfg.metadata.name.as_deref(),
            Some(RESOURCE_MUTATING_CONFIGURATION_NAME)
        );

        let webhooks = cfg.webhooks.unwrap();
        assert_eq!(webhooks.len(), 1);
        let webhook = &webhooks[0];
        assert_eq!(webhook.name, RESOURCE_MUTATING_WEBHOOK_NAME);
        assert_eq!(webhook.timeout_seconds, Some(7));
        assert_eq!(webhook.failure_policy.as_deref(), Some("Ignore"));
        assert!(webhook.namespace_selector.is_none());

        let rule = &webhook.rules.as_ref().unwrap()[0];
        assert_eq!(rule.resources, Some(vec!["*/*".to_string()]));
        assert_eq!(
            rule.operations,
            Some(vec!["CREATE".to_string(), "UPDATE".to_string()])
        );
    }

    #[test]
    fn test_verify_configuration_matches_deployments() {
        let WebhookConfiguration::Mutating(cfg) =
            build_configuration(Role::VerificationMutation, &standard(), CA, 10)
        else {
            panic!("expected a mutating configuration");
        };
        let rule = &cfg.webhooks.unwrap()[0].rules.clone().unwrap()[0];
        assert_eq!(rule.api_groups, Some(vec!["apps".to_string()]));
        assert_eq!(rule.resources, Some(vec!["deployments/*".to_string()]));
        assert_eq!(rule.operations, Some(vec!["UPDATE".to_string()]));
    }

    #[test]
    fn test_builders_are_deterministic() {
        for role in Role::ALL {
            assert_eq!(
                build_configuration(role, &debug(), CA, 10),
                build_configuration(role, &debug(), CA, 10)
            );
        }
    }

    #[test]
    fn test_to_dynamic_keeps_identity() {
        let cfg = build_configuration(Role::PolicyValidation, &standard(), CA, 10);
        let obj = cfg.to_dynamic().unwrap();
        assert_eq!(
            obj.metadata.name.as_deref(),
            Some(POLICY_VALIDATING_CONFIGURATION_NAME)
        );
        let types = obj.types.unwrap();
        assert_eq!(types.kind, "ValidatingWebhookConfiguration");
        assert_eq!(types.api_version, "admissionregistration.k8s.io/v1");
    }
}
