//! User Management Operator Library
//!
//! This library provides the core functionality for the User Management Operator:
//! a Kubernetes controller that converges `AccountIAM` instances into a running
//! account IAM operand.
//!
//! ## Quick Start
//!
//! ```rust
//! use user_management_operator::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod manifests;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
