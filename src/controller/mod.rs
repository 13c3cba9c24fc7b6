//! Controller module for admission-registrar.
//!
//! Contains the registration lifecycle: reconciliation, teardown, health
//! check, the dynamic update loop, and liveness-gated shutdown.

pub mod context;
pub mod error;
pub mod registrar;
pub mod settings;
pub mod shutdown;
pub mod update;

pub use context::Context;
pub use error::{Error, Result, RoleFailure};
pub use registrar::Registrar;
pub use settings::{ConfigMapSettings, ConfigProvider, WebhookSettings};
pub use shutdown::CompletionSignal;
pub use update::{UpdateNotifier, UpdateQueue, UpdateRequest, update_channel};
