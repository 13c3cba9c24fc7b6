// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for admission-registrar.
//!
//! Uses proptest to generate random inputs and verify invariants.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::DynamicObject;
use proptest::prelude::*;

use admission_registrar::client::{ClusterClient, ResourceKey, ResourceKind};
use admission_registrar::config::RegistrarConfig;
use admission_registrar::controller::error::{Error, Result};
use admission_registrar::controller::{Context, Registrar};
use admission_registrar::resources::ca::StaticCaBundle;
use admission_registrar::resources::role::{AddressingMode, Role, ServiceTarget};
use admission_registrar::resources::webhooks::build_configuration;

/// Client whose creates fail for a fixed set of names and whose deletes
/// always report not-found.
#[derive(Default)]
struct CreateRecorder {
    failing: HashSet<String>,
    creates: Mutex<HashMap<String, usize>>,
}

#[async_trait]
impl ClusterClient for CreateRecorder {
    async fn get(&self, key: &ResourceKey) -> Result<DynamicObject> {
        Err(Error::NotFound {
            kind: key.kind.kind.to_string(),
            name: key.name.clone(),
        })
    }

    async fn list(&self, _: ResourceKind, _: Option<&str>, _: &str) -> Result<Vec<DynamicObject>> {
        Ok(Vec::new())
    }

    async fn create(&self, _: ResourceKind, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        *self.creates.lock().unwrap().entry(name.clone()).or_default() += 1;
        if self.failing.contains(&name) {
            return Err(Error::Transient(format!("create {} refused", name)));
        }
        Ok(obj.clone())
    }

    async fn update(&self, _: ResourceKind, obj: &DynamicObject) -> Result<DynamicObject> {
        Ok(obj.clone())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        Err(Error::NotFound {
            kind: key.kind.kind.to_string(),
            name: key.name.clone(),
        })
    }
}

/// Strategy for subsets of roles, as a membership mask over `Role::ALL`.
fn role_subset() -> impl Strategy<Value = Vec<Role>> {
    prop::array::uniform5(any::<bool>()).prop_map(|mask| {
        Role::ALL
            .iter()
            .zip(mask)
            .filter(|(_, failing)| *failing)
            .map(|(role, _)| *role)
            .collect()
    })
}

fn any_role() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

fn any_mode() -> impl Strategy<Value = AddressingMode> {
    prop_oneof![
        Just(AddressingMode::Standard(ServiceTarget {
            namespace: "kyverno".to_string(),
            name: "kyverno-svc".to_string(),
            port: 443,
        })),
        "[a-z0-9.]{1,20}:[0-9]{2,5}".prop_map(|server_address| AddressingMode::Debug { server_address }),
    ]
}

fn debug_config() -> RegistrarConfig {
    RegistrarConfig {
        server_address: Some("192.168.1.20:9443".to_string()),
        ..Default::default()
    }
}

proptest! {
    /// Property: every create is attempted and the aggregate names exactly
    /// the failing roles, in creation order.
    #[test]
    fn test_failing_roles_are_aggregated(failing in role_subset()) {
        let config = debug_config();
        let mode = config.addressing_mode();
        let client = Arc::new(CreateRecorder {
            failing: failing
                .iter()
                .map(|role| role.descriptor().name(&mode).to_string())
                .collect(),
            ..Default::default()
        });
        let registrar = Registrar::new(Context::new(
            client.clone(),
            Arc::new(StaticCaBundle(b"ca".to_vec())),
            &config,
        ));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = runtime.block_on(registrar.register());

        let creates = client.creates.lock().unwrap().clone();
        prop_assert_eq!(creates.len(), 5);
        prop_assert!(creates.values().all(|count| *count == 1));

        match result {
            Ok(()) => prop_assert!(failing.is_empty()),
            Err(e) => prop_assert_eq!(e.failed_roles(), failing),
        }
    }

    /// Property: a single build never mixes addressing modes.
    #[test]
    fn test_builders_use_one_addressing_mode(
        role in any_role(),
        mode in any_mode(),
        timeout in 1..=30i32,
        ca in prop::collection::vec(any::<u8>(), 1..64)
    ) {
        let config = build_configuration(role, &mode, &ca, timeout);

        prop_assert_eq!(config.kind(), role.kind());
        prop_assert_eq!(config.name().ends_with("-debug"), mode.is_debug());
        for client in config.client_configs() {
            prop_assert_eq!(client.url.is_some(), mode.is_debug());
            prop_assert_eq!(client.service.is_none(), mode.is_debug());
            prop_assert_eq!(&client.ca_bundle.as_ref().unwrap().0, &ca);
        }
    }

    /// Property: builders are deterministic.
    #[test]
    fn test_builders_are_deterministic(role in any_role(), mode in any_mode(), timeout in 1..=30i32) {
        prop_assert_eq!(
            build_configuration(role, &mode, b"ca", timeout),
            build_configuration(role, &mode, b"ca", timeout)
        );
    }

    /// Property: webhook timeouts outside 1..=30 are rejected.
    #[test]
    fn test_timeout_bounds(timeout in -100..100i32) {
        let parsed = RegistrarConfig::from_lookup(|key| {
            (key == "WEBHOOK_TIMEOUT").then(|| timeout.to_string())
        });
        prop_assert_eq!(parsed.is_ok(), (1..=30).contains(&timeout));
    }
}
