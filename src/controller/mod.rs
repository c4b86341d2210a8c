//! # Controller
//!
//! Core controller modules for the User Management Operator.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `crdgen`: CRD generation utility
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod crdgen;
pub mod reconciler;
pub mod server;
