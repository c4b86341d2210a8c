//! # Reconciler
//!
//! Core reconciliation logic for `AccountIAM` resources.
//!
//! The reconciler:
//! - Verifies the EDB and WebSphere Liberty operators are installed
//! - Establishes the `user-mgmt-bootstrap` secret that carries generated credentials
//! - Renders the operand manifests and applies them with create-or-update semantics
//! - Aligns the identity provider issuer and restarts the pods that read it
//! - Updates resource status with the outcome of each cycle
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the instance (skip when absent or suspended)
//! 2. Probe the capability catalogue for prerequisite operators
//! 3. Fetch or generate the bootstrap record, clear one-shot Jobs
//! 4. Apply the core manifest groups, then the issuer guard
//! 5. Configure the IM integration and the UI
//! 6. Restart affected components and wait for readiness
//! 7. Update status

pub mod apply;
pub mod bootstrap;
pub mod codec;
pub mod integration;
pub mod orchestrator;
pub mod probe;
pub mod reconcile;
pub mod restart;
pub mod status;
pub mod template;
pub mod types;

// Re-export public API
pub use orchestrator::{CycleReport, ReconcileOrchestrator};
pub use reconcile::reconcile;
pub use restart::RestartSettings;
pub use status::update_status;
pub use types::{BackoffState, CycleError, ErrorClass, Reconciler, ReconcilerError, Stage};
