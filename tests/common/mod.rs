//! Common test utilities for integration tests
//!
//! Provides the cluster fixtures a full reconciliation cycle reads: the instance,
//! the console and account-iam routes, the cluster-info and IdP ConfigMaps, and the
//! identity Deployments with their Pods.

#![allow(dead_code, reason = "each test binary uses a different subset of fixtures")]

use kube::core::DynamicObject;
use serde_json::{json, Value};
use std::sync::{Arc, Once};
use std::time::Duration;
use user_management_operator::constants::{
    ACCOUNT_IAM_ROUTE, CLUSTER_INFO_CONFIGMAP, CP_CONSOLE_ROUTE, EDB_CLUSTER_KIND,
    EDB_GROUP_VERSION, IDP_CONFIGMAP, ISSUER_RESTART_TARGETS, OIDC_ISSUER_URL_KEY,
    WEBSPHERE_GROUP_VERSION, WEBSPHERE_KIND,
};
use user_management_operator::controller::reconciler::RestartSettings;
use user_management_operator::store::MemoryStore;

pub const NAMESPACE: &str = "ns1";
pub const INSTANCE: &str = "example";
pub const CONSOLE_HOST: &str = "cp-console-ns1.apps.example.com";
pub const ACCOUNT_IAM_HOST: &str = "account-iam-ns1.apps.example.com";

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

pub fn object(value: Value) -> DynamicObject {
    serde_json::from_value(value).expect("fixture must be a valid object")
}

/// Issuer URL a freshly generated bootstrap record points at
pub fn expected_issuer() -> String {
    format!("https://{CONSOLE_HOST}/idprovider/v1/auth")
}

pub fn instance() -> DynamicObject {
    object(json!({
        "apiVersion": "operator.ibm.com/v1alpha1",
        "kind": "AccountIAM",
        "metadata": { "name": INSTANCE, "namespace": NAMESPACE },
        "spec": {}
    }))
}

pub fn route(name: &str, host: &str) -> DynamicObject {
    object(json!({
        "apiVersion": "route.openshift.io/v1",
        "kind": "Route",
        "metadata": { "name": name, "namespace": NAMESPACE },
        "spec": { "host": host }
    }))
}

pub fn cluster_info() -> DynamicObject {
    object(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": CLUSTER_INFO_CONFIGMAP, "namespace": NAMESPACE },
        "data": {
            "cluster_kube_apiserver_host": "api.example.com",
            "cluster_endpoint": "https://cp-console-ns1.apps.example.com"
        }
    }))
}

pub fn idp_config(issuer: &str) -> DynamicObject {
    object(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": IDP_CONFIGMAP, "namespace": NAMESPACE },
        "data": { OIDC_ISSUER_URL_KEY: issuer, "PROVIDER_ISSUER_URL": "" }
    }))
}

pub fn deployment(app: &str, replicas: i64, ready: i64) -> DynamicObject {
    object(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": app, "namespace": NAMESPACE },
        "spec": { "replicas": replicas },
        "status": { "readyReplicas": ready }
    }))
}

pub fn pod(app: &str, name: &str) -> DynamicObject {
    object(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": NAMESPACE,
            "labels": { "app": app }
        },
        "status": { "conditions": [{ "type": "Ready", "status": "True" }] }
    }))
}

/// Store where both operators are installed but nothing else exists
pub fn prerequisites_store() -> MemoryStore {
    MemoryStore::with_capabilities([
        (EDB_GROUP_VERSION, EDB_CLUSTER_KIND),
        (WEBSPHERE_GROUP_VERSION, WEBSPHERE_KIND),
    ])
}

/// Seed everything other components publish for the instance
pub fn seed_cluster(store: &MemoryStore, issuer: &str) {
    store.seed(instance()).unwrap();
    store.seed(route(CP_CONSOLE_ROUTE, CONSOLE_HOST)).unwrap();
    store.seed(route(ACCOUNT_IAM_ROUTE, ACCOUNT_IAM_HOST)).unwrap();
    store.seed(cluster_info()).unwrap();
    store.seed(idp_config(issuer)).unwrap();
    for app in ISSUER_RESTART_TARGETS {
        store.seed(deployment(app, 1, 1)).unwrap();
        store.seed(pod(app, &format!("{app}-0"))).unwrap();
    }
}

/// A fully prepared cluster whose issuer URL still needs aligning
pub fn cluster_store(issuer: &str) -> Arc<MemoryStore> {
    let store = prerequisites_store();
    seed_cluster(&store, issuer);
    Arc::new(store)
}

pub fn fast_restart() -> RestartSettings {
    RestartSettings {
        settle: Duration::from_millis(1),
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(200),
    }
}
