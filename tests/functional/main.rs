// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the webhook registration lifecycle.
//!
//! These tests drive the real registrar against an in-memory cluster
//! WITHOUT requiring a live Kubernetes cluster.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_standard_reconciliation_creates_service_registrations
//!
//! # Run with verbose output
//! cargo test --test functional -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! - **Registration tests**: readiness gate, full reconciliation, teardown, health check
//! - **Update loop tests**: namespace selector updates and retry resubmission
//! - **Shutdown tests**: liveness-gated cleanup and the completion signal
//! - **Settings tests**: init ConfigMap validation

mod fake_cluster;

// Re-export for use in tests
pub use fake_cluster::*;
