//! # Custom Resource Definitions
//!
//! CRD types for the User Management Operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `AccountIAM` specification
//! - `status.rs` - Status types for tracking reconciliation state

mod spec;
mod status;

pub use spec::{AccountIAM, AccountIAMSpec};
pub use status::{AccountIAMStatus, Condition, Phase};
