//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config::ControllerConfig`]).

/// Field manager recorded on status patches
pub const FIELD_MANAGER: &str = "user-management-operator";

/// Default port for the metrics and probe server
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default timeout waiting for the HTTP server to bind (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default poll interval while waiting for the HTTP server (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default requeue after a transient store failure, a timeout or a cancelled cycle (seconds)
pub const DEFAULT_TRANSIENT_REQUEUE_SECS: u64 = 30;

/// Default Fibonacci backoff floor for prerequisite and data errors (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Default Fibonacci backoff ceiling (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Consecutive restart timeouts before the failure is escalated
pub const DEFAULT_TIMEOUT_ESCALATION_THRESHOLD: u32 = 3;

/// Default interval between readiness polls after a restart (seconds)
pub const DEFAULT_RESTART_POLL_INTERVAL_SECS: u64 = 20;

/// Default overall readiness deadline after a restart (seconds)
pub const DEFAULT_RESTART_TIMEOUT_SECS: u64 = 120;

/// Default settle delay between deleting a unit and the first readiness poll (seconds)
pub const DEFAULT_RESTART_SETTLE_SECS: u64 = 10;

/// Default watch stream restart delay after errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default watch stream restart backoff start (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_START_MS: u64 = 1000;

/// Default watch stream restart backoff ceiling (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_MAX_MS: u64 = 30_000;

// Objects owned or read by the operator in the instance namespace

/// Persistent bootstrap record
pub const BOOTSTRAP_SECRET_NAME: &str = "user-mgmt-bootstrap";

/// Route whose host seeds the IAM host URL default
pub const CP_CONSOLE_ROUTE: &str = "cp-console";

/// Route published by the operand
pub const ACCOUNT_IAM_ROUTE: &str = "account-iam";

/// ConfigMap describing the cluster endpoints
pub const CLUSTER_INFO_CONFIGMAP: &str = "ibmcloud-cluster-info";

/// Identity provider ConfigMap carrying the OIDC issuer
pub const IDP_CONFIGMAP: &str = "platform-auth-idp";

/// Issuer key inside [`IDP_CONFIGMAP`]
pub const OIDC_ISSUER_URL_KEY: &str = "OIDC_ISSUER_URL";

/// Annotation on [`IDP_CONFIGMAP`] listing components still owed a restart
pub const PENDING_RESTARTS_ANNOTATION: &str = "operator.ibm.com/pending-restarts";

/// One-shot Jobs removed before operand resources are re-applied
pub const STALE_JOBS: [&str; 2] = ["account-iam-db-migration-mcspid", "create-account-iam-db"];

/// Components restarted when the OIDC issuer is rewritten
pub const ISSUER_RESTART_TARGETS: [&str; 2] =
    ["platform-auth-service", "platform-identity-provider"];

/// Random bytes behind the generated database password
pub const PASSWORD_LENGTH_BYTES: usize = 20;

/// Prerequisite capability: database cluster operator
pub const EDB_GROUP_VERSION: &str = "postgresql.k8s.enterprisedb.io/v1";
pub const EDB_CLUSTER_KIND: &str = "Cluster";

/// Prerequisite capability: application server operator
pub const WEBSPHERE_GROUP_VERSION: &str = "liberty.websphere.ibm.com/v1";
pub const WEBSPHERE_KIND: &str = "WebSphereLibertyApplication";
