//! Desired-state generation for webhook registrations.
//!
//! ## Contents
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `role` | Roles, addressing modes, and the role descriptor table |
//! | `webhooks` | Mutating/Validating configuration builders |
//! | `ca` | CA bundle sources |
//! | `common` | Fixed names, paths, and labels |

pub mod ca;
pub mod common;
pub mod role;
pub mod webhooks;

pub use role::{AddressingMode, Role, ServiceTarget, WebhookKind};
pub use webhooks::{WebhookConfiguration, build_configuration};
