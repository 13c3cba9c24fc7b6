//! Webhook roles, addressing modes, and the role descriptor table.
//!
//! Every per-role decision (configuration kind, identity name per mode,
//! webhook name, service path, match rules) is resolved through
//! [`Role::descriptor`], so create, remove, and check share one code path.

use std::fmt;

use super::common::*;

/// The five logical webhook registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Validates policy objects
    PolicyValidation,
    /// Defaults policy objects
    PolicyMutation,
    /// Validates arbitrary resources against policies
    ResourceValidation,
    /// Mutates arbitrary resources according to policies
    ResourceMutation,
    /// Deployment self-check webhook
    VerificationMutation,
}

impl Role {
    /// All roles, in creation order
    pub const ALL: [Role; 5] = [
        Role::VerificationMutation,
        Role::PolicyValidation,
        Role::PolicyMutation,
        Role::ResourceValidation,
        Role::ResourceMutation,
    ];

    /// The roles whose first rule carries a mutable namespace selector
    pub const RESOURCE_FACING: [Role; 2] = [Role::ResourceMutation, Role::ResourceValidation];

    /// Look up the static descriptor for this role
    pub fn descriptor(self) -> &'static RoleDescriptor {
        match self {
            Role::PolicyValidation => &POLICY_VALIDATION,
            Role::PolicyMutation => &POLICY_MUTATION,
            Role::ResourceValidation => &RESOURCE_VALIDATION,
            Role::ResourceMutation => &RESOURCE_MUTATION,
            Role::VerificationMutation => &VERIFICATION_MUTATION,
        }
    }

    pub fn kind(self) -> WebhookKind {
        self.descriptor().kind
    }

    /// Whether the update loop may patch this role's namespace selector
    pub fn is_resource_facing(self) -> bool {
        Self::RESOURCE_FACING.contains(&self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::PolicyValidation => write!(f, "PolicyValidation"),
            Role::PolicyMutation => write!(f, "PolicyMutation"),
            Role::ResourceValidation => write!(f, "ResourceValidation"),
            Role::ResourceMutation => write!(f, "ResourceMutation"),
            Role::VerificationMutation => write!(f, "VerificationMutation"),
        }
    }
}

/// Admission registration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookKind {
    Mutating,
    Validating,
}

impl WebhookKind {
    /// Kubernetes kind name
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookKind::Mutating => "MutatingWebhookConfiguration",
            WebhookKind::Validating => "ValidatingWebhookConfiguration",
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-cluster service the API server calls in standard mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub namespace: String,
    pub name: String,
    pub port: i32,
}

/// How the API server reaches the webhook server.
///
/// Resolved once when the registrar is constructed; a registrar never
/// operates on both name variants of a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressingMode {
    /// In-cluster service reference
    Standard(ServiceTarget),
    /// Direct external address, for running the server outside the cluster
    Debug { server_address: String },
}

impl AddressingMode {
    pub fn is_debug(&self) -> bool {
        matches!(self, AddressingMode::Debug { .. })
    }

    /// External URL for a service path, in debug mode only
    pub fn url_for(&self, path: &str) -> Option<String> {
        match self {
            AddressingMode::Debug { server_address } => {
                Some(format!("https://{}{}", server_address, path))
            }
            AddressingMode::Standard(_) => None,
        }
    }
}

/// Static match rule for a webhook
#[derive(Debug, Clone, Copy)]
pub struct MatchRule {
    pub api_groups: &'static [&'static str],
    pub api_versions: &'static [&'static str],
    pub resources: &'static [&'static str],
    pub operations: &'static [&'static str],
}

/// Everything needed to name, build, and locate one role's registration
#[derive(Debug)]
pub struct RoleDescriptor {
    pub role: Role,
    pub kind: WebhookKind,
    pub standard_name: &'static str,
    pub debug_name: &'static str,
    pub webhook_name: &'static str,
    pub path: &'static str,
    pub rule: MatchRule,
    pub failure_policy: &'static str,
    pub side_effects: &'static str,
}

impl RoleDescriptor {
    /// Registration name for the given addressing mode
    pub fn name(&self, mode: &AddressingMode) -> &'static str {
        if mode.is_debug() {
            self.debug_name
        } else {
            self.standard_name
        }
    }
}

const POLICY_RULE: MatchRule = MatchRule {
    api_groups: &["kyverno.io"],
    api_versions: &["v1"],
    resources: &["clusterpolicies/*", "policies/*"],
    operations: &["CREATE", "UPDATE"],
};

const POLICY_VALIDATION: RoleDescriptor = RoleDescriptor {
    role: Role::PolicyValidation,
    kind: WebhookKind::Validating,
    standard_name: POLICY_VALIDATING_CONFIGURATION_NAME,
    debug_name: POLICY_VALIDATING_CONFIGURATION_DEBUG_NAME,
    webhook_name: POLICY_VALIDATING_WEBHOOK_NAME,
    path: POLICY_VALIDATING_PATH,
    rule: POLICY_RULE,
    failure_policy: "Ignore",
    side_effects: "NoneOnDryRun",
};

const POLICY_MUTATION: RoleDescriptor = RoleDescriptor {
    role: Role::PolicyMutation,
    kind: WebhookKind::Mutating,
    standard_name: POLICY_MUTATING_CONFIGURATION_NAME,
    debug_name: POLICY_MUTATING_CONFIGURATION_DEBUG_NAME,
    webhook_name: POLICY_MUTATING_WEBHOOK_NAME,
    path: POLICY_MUTATING_PATH,
    rule: POLICY_RULE,
    failure_policy: "Ignore",
    side_effects: "NoneOnDryRun",
};

const RESOURCE_VALIDATION: RoleDescriptor = RoleDescriptor {
    role: Role::ResourceValidation,
    kind: WebhookKind::Validating,
    standard_name: RESOURCE_VALIDATING_CONFIGURATION_NAME,
    debug_name: RESOURCE_VALIDATING_CONFIGURATION_DEBUG_NAME,
    webhook_name: RESOURCE_VALIDATING_WEBHOOK_NAME,
    path: RESOURCE_VALIDATING_PATH,
    rule: MatchRule {
        api_groups: &["*"],
        api_versions: &["*"],
        resources: &["*/*"],
        operations: &["CREATE", "UPDATE", "DELETE", "CONNECT"],
    },
    failure_policy: "Ignore",
    side_effects: "NoneOnDryRun",
};

const RESOURCE_MUTATION: RoleDescriptor = RoleDescriptor {
    role: Role::ResourceMutation,
    kind: WebhookKind::Mutating,
    standard_name: RESOURCE_MUTATING_CONFIGURATION_NAME,
    debug_name: RESOURCE_MUTATING_CONFIGURATION_DEBUG_NAME,
    webhook_name: RESOURCE_MUTATING_WEBHOOK_NAME,
    path: RESOURCE_MUTATING_PATH,
    rule: MatchRule {
        api_groups: &["*"],
        api_versions: &["*"],
        resources: &["*/*"],
        operations: &["CREATE", "UPDATE"],
    },
    failure_policy: "Ignore",
    side_effects: "NoneOnDryRun",
};

const VERIFICATION_MUTATION: RoleDescriptor = RoleDescriptor {
    role: Role::VerificationMutation,
    kind: WebhookKind::Mutating,
    standard_name: VERIFY_MUTATING_CONFIGURATION_NAME,
    debug_name: VERIFY_MUTATING_CONFIGURATION_DEBUG_NAME,
    webhook_name: VERIFY_MUTATING_WEBHOOK_NAME,
    path: VERIFY_MUTATING_PATH,
    rule: MatchRule {
        api_groups: &["apps"],
        api_versions: &["v1"],
        resources: &["deployments/*"],
        operations: &["UPDATE"],
    },
    failure_policy: "Ignore",
    side_effects: "NoneOnDryRun",
};
