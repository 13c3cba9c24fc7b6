//! Fixed identities shared by the builders and the registrar.
//!
//! Registration names, webhook names, and service paths are part of the
//! contract with the webhook server and are not configurable.

use std::collections::BTreeMap;

pub const POLICY_VALIDATING_CONFIGURATION_NAME: &str = "kyverno-policy-validating-webhook-cfg";
pub const POLICY_VALIDATING_CONFIGURATION_DEBUG_NAME: &str =
    "kyverno-policy-validating-webhook-cfg-debug";
pub const POLICY_VALIDATING_WEBHOOK_NAME: &str = "validate-policy.kyverno.svc";
pub const POLICY_VALIDATING_PATH: &str = "/policyvalidate";

pub const POLICY_MUTATING_CONFIGURATION_NAME: &str = "kyverno-policy-mutating-webhook-cfg";
pub const POLICY_MUTATING_CONFIGURATION_DEBUG_NAME: &str =
    "kyverno-policy-mutating-webhook-cfg-debug";
pub const POLICY_MUTATING_WEBHOOK_NAME: &str = "mutate-policy.kyverno.svc";
pub const POLICY_MUTATING_PATH: &str = "/policymutate";

pub const RESOURCE_VALIDATING_CONFIGURATION_NAME: &str = "kyverno-resource-validating-webhook-cfg";
pub const RESOURCE_VALIDATING_CONFIGURATION_DEBUG_NAME: &str =
    "kyverno-resource-validating-webhook-cfg-debug";
pub const RESOURCE_VALIDATING_WEBHOOK_NAME: &str = "validate.kyverno.svc";
pub const RESOURCE_VALIDATING_PATH: &str = "/validate";

pub const RESOURCE_MUTATING_CONFIGURATION_NAME: &str = "kyverno-resource-mutating-webhook-cfg";
pub const RESOURCE_MUTATING_CONFIGURATION_DEBUG_NAME: &str =
    "kyverno-resource-mutating-webhook-cfg-debug";
pub const RESOURCE_MUTATING_WEBHOOK_NAME: &str = "mutate.kyverno.svc";
pub const RESOURCE_MUTATING_PATH: &str = "/mutate";

pub const VERIFY_MUTATING_CONFIGURATION_NAME: &str = "kyverno-verify-mutating-webhook-cfg";
pub const VERIFY_MUTATING_CONFIGURATION_DEBUG_NAME: &str =
    "kyverno-verify-mutating-webhook-cfg-debug";
pub const VERIFY_MUTATING_WEBHOOK_NAME: &str = "monitor-webhooks.kyverno.svc";
pub const VERIFY_MUTATING_PATH: &str = "/verifymutate";

/// Port the webhook service listens on
pub const SERVICE_PORT: i32 = 443;

/// Label selecting the admission server pods
pub const POD_NAME_LABEL: &str = "app.kubernetes.io/name";
pub const POD_NAME_VALUE: &str = "kyverno";

/// Ownership label carried by secrets the policy engine manages
pub const MANAGED_BY_LABEL: &str = "cert.kyverno.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "kyverno";

/// Labels applied to every registration object
pub fn standard_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "admission-registrar".to_string(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "webhook-registration".to_string(),
    );
    labels
}

/// Label selector string for the admission server pods
pub fn pod_label_selector() -> String {
    format!("{}={}", POD_NAME_LABEL, POD_NAME_VALUE)
}

/// Label selector string for managed secrets
pub fn managed_secret_selector() -> String {
    format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE)
}
