//! # Restart Coordinator
//!
//! Cycles one running unit and waits for its replacement:
//! resolve the unit by label selector, delete it, let the controller notice, then poll
//! readiness on a fixed interval until a deadline. Readiness is read from the governing
//! Deployment (`readyReplicas == replicas`) or from the replacement Pod's `Ready`
//! condition. Every wait observes the cycle's cancellation token.

use crate::observability;
use crate::store::{Propagation, ResourceKind, ResourceStore, StoreError};
use kube::core::DynamicObject;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing of one restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartSettings {
    /// Wait after the delete before the first readiness check
    pub settle: Duration,
    pub poll_interval: Duration,
    /// Deadline for readiness, measured from the end of the settle wait
    pub timeout: Duration,
}

/// Where readiness is observed after the unit is deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbe {
    /// Governing Deployment reports every desired replica ready
    Deployment { name: String },
    /// A Pod matching the selector, other than the deleted one, reports `Ready=True`
    Unit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartTarget {
    pub namespace: String,
    pub label_selector: String,
    pub probe: ReadinessProbe,
}

impl RestartTarget {
    /// Pods labelled `app={app}`, governed by the Deployment of the same name
    pub fn deployment(namespace: &str, app: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            label_selector: format!("app={app}"),
            probe: ReadinessProbe::Deployment {
                name: app.to_string(),
            },
        }
    }

    /// Pods matching `label_selector`, judged by their own readiness
    pub fn unit(namespace: &str, label_selector: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            label_selector: label_selector.to_string(),
            probe: ReadinessProbe::Unit,
        }
    }

    /// Pick the probe for `app` from what is deployed right now
    ///
    /// Components governed by a Deployment of the same name are judged by it; anything
    /// else falls back to the readiness of its own Pods.
    pub async fn resolve(
        store: &dyn ResourceStore,
        namespace: &str,
        app: &str,
    ) -> Result<Self, StoreError> {
        let governed = store
            .get(&ResourceKind::deployment(), namespace, app)
            .await?
            .is_some();
        if governed {
            Ok(Self::deployment(namespace, app))
        } else {
            Ok(Self::unit(namespace, &format!("app={app}")))
        }
    }

    pub fn describe(&self) -> String {
        match &self.probe {
            ReadinessProbe::Deployment { name } => format!("{}/{}", self.namespace, name),
            ReadinessProbe::Unit => format!("{}/[{}]", self.namespace, self.label_selector),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

impl RestartOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartOutcome::Ready => "ready",
            RestartOutcome::TimedOut => "timeout",
            RestartOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum RestartError {
    #[error("no running unit matches {selector} in {namespace}")]
    NoMatchingUnit { namespace: String, selector: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct RestartCoordinator<'a> {
    store: &'a dyn ResourceStore,
    settings: RestartSettings,
}

impl std::fmt::Debug for RestartCoordinator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartCoordinator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<'a> RestartCoordinator<'a> {
    pub fn new(store: &'a dyn ResourceStore, settings: RestartSettings) -> Self {
        Self { store, settings }
    }

    pub async fn restart(
        &self,
        target: &RestartTarget,
        cancel: &CancellationToken,
    ) -> Result<RestartOutcome, RestartError> {
        let outcome = self.cycle(target, cancel).await;
        if let Ok(outcome) = &outcome {
            observability::metrics::increment_restarts(outcome.as_str());
        }
        outcome
    }

    async fn cycle(
        &self,
        target: &RestartTarget,
        cancel: &CancellationToken,
    ) -> Result<RestartOutcome, RestartError> {
        let pods = ResourceKind::pod();

        // Resolve
        let units = self
            .store
            .list(&pods, &target.namespace, &target.label_selector)
            .await?;
        let Some(unit) = units.first().and_then(|u| u.metadata.name.clone()) else {
            return Err(RestartError::NoMatchingUnit {
                namespace: target.namespace.clone(),
                selector: target.label_selector.clone(),
            });
        };

        // Delete
        match self
            .store
            .delete(&pods, &target.namespace, &unit, Propagation::Background)
            .await
        {
            Ok(()) => info!(target = %target.describe(), unit = %unit, "🔄 Deleted unit for restart"),
            Err(StoreError::NotFound { .. }) => {
                debug!(unit = %unit, "Unit disappeared before it could be deleted");
            }
            Err(e) => return Err(e.into()),
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(RestartOutcome::Cancelled),
            () = tokio::time::sleep(self.settings.settle) => {}
        }

        // PollReady
        let deadline = Instant::now() + self.settings.timeout;
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(RestartOutcome::Cancelled),
                () = tokio::time::sleep_until(deadline) => return Ok(self.timed_out(target)),
                _ = ticker.tick() => {}
            }

            // The store read counts against the same deadline
            let ready = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(RestartOutcome::Cancelled),
                () = tokio::time::sleep_until(deadline) => return Ok(self.timed_out(target)),
                ready = self.is_ready(target, &unit) => ready?,
            };
            if ready {
                info!(target = %target.describe(), "✅ Restarted component is ready");
                return Ok(RestartOutcome::Ready);
            }
            debug!(target = %target.describe(), "Waiting for restarted component");
        }
    }

    fn timed_out(&self, target: &RestartTarget) -> RestartOutcome {
        warn!(
            target = %target.describe(),
            timeout_secs = self.settings.timeout.as_secs(),
            "Restarted component did not become ready in time"
        );
        RestartOutcome::TimedOut
    }

    async fn is_ready(&self, target: &RestartTarget, deleted: &str) -> Result<bool, StoreError> {
        match &target.probe {
            ReadinessProbe::Deployment { name } => {
                let deployment = self
                    .store
                    .get(&ResourceKind::deployment(), &target.namespace, name)
                    .await?;
                Ok(deployment.as_ref().is_some_and(deployment_ready))
            }
            ReadinessProbe::Unit => {
                let units = self
                    .store
                    .list(&ResourceKind::pod(), &target.namespace, &target.label_selector)
                    .await?;
                Ok(units
                    .iter()
                    .filter(|u| u.metadata.name.as_deref() != Some(deleted))
                    .any(pod_ready))
            }
        }
    }
}

/// `status.readyReplicas` equals `spec.replicas` (which defaults to 1)
pub fn deployment_ready(deployment: &DynamicObject) -> bool {
    let desired = deployment
        .data
        .pointer("/spec/replicas")
        .and_then(Value::as_i64)
        .unwrap_or(1);
    let ready = deployment
        .data
        .pointer("/status/readyReplicas")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    ready == desired
}

/// The Pod carries a `Ready` condition with status `True`
pub fn pod_ready(pod: &DynamicObject) -> bool {
    pod.data
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some("Ready")
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Capability, MemoryStore};
    use async_trait::async_trait;
    use serde_json::json;

    /// Serves everything from memory except `get`, which never answers
    struct StalledReads(MemoryStore);

    #[async_trait]
    impl ResourceStore for StalledReads {
        async fn get(
            &self,
            _kind: &ResourceKind,
            _namespace: &str,
            _name: &str,
        ) -> Result<Option<DynamicObject>, StoreError> {
            std::future::pending().await
        }

        async fn list(
            &self,
            kind: &ResourceKind,
            namespace: &str,
            label_selector: &str,
        ) -> Result<Vec<DynamicObject>, StoreError> {
            self.0.list(kind, namespace, label_selector).await
        }

        async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
            self.0.create(object).await
        }

        async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
            self.0.update(object).await
        }

        async fn delete(
            &self,
            kind: &ResourceKind,
            namespace: &str,
            name: &str,
            propagation: Propagation,
        ) -> Result<(), StoreError> {
            self.0.delete(kind, namespace, name, propagation).await
        }

        async fn capabilities(&self) -> Result<Vec<Capability>, StoreError> {
            self.0.capabilities().await
        }
    }

    fn pod(name: &str) -> DynamicObject {
        object(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": name, "namespace": "ns1", "labels": { "app": "auth" } }
        }))
    }

    fn object(value: Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    fn deployment(replicas: i64, ready: i64) -> DynamicObject {
        object(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "auth", "namespace": "ns1" },
            "spec": { "replicas": replicas },
            "status": { "readyReplicas": ready }
        }))
    }

    #[test]
    fn test_deployment_ready_compares_replicas() {
        assert!(deployment_ready(&deployment(2, 2)));
        assert!(!deployment_ready(&deployment(2, 1)));
        let no_status = object(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "auth" }
        }));
        assert!(!deployment_ready(&no_status));
    }

    #[test]
    fn test_pod_ready_reads_condition() {
        let ready = object(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "p" },
            "status": { "conditions": [
                { "type": "PodScheduled", "status": "True" },
                { "type": "Ready", "status": "True" }
            ]}
        }));
        let starting = object(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "p" },
            "status": { "conditions": [{ "type": "Ready", "status": "False" }] }
        }));
        assert!(pod_ready(&ready));
        assert!(!pod_ready(&starting));
    }

    #[test]
    fn test_deployment_target_selector() {
        let target = RestartTarget::deployment("ns1", "platform-auth-service");
        assert_eq!(target.label_selector, "app=platform-auth-service");
        assert_eq!(
            target.probe,
            ReadinessProbe::Deployment {
                name: "platform-auth-service".into()
            }
        );
    }

    #[tokio::test]
    async fn test_no_matching_unit_is_an_error() {
        let store = MemoryStore::new();
        let settings = RestartSettings {
            settle: Duration::ZERO,
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
        };
        let err = RestartCoordinator::new(&store, settings)
            .restart(
                &RestartTarget::deployment("ns1", "auth"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RestartError::NoMatchingUnit { .. }));
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_readiness_read_still_times_out() {
        let store = StalledReads(MemoryStore::new());
        store.0.seed(pod("auth-0")).unwrap();
        let settings = RestartSettings {
            settle: Duration::ZERO,
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            RestartCoordinator::new(&store, settings).restart(
                &RestartTarget::deployment("ns1", "auth"),
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("coordinator overran its deadline")
        .unwrap();

        assert_eq!(outcome, RestartOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_resolve_prefers_governing_deployment() {
        let store = MemoryStore::new();
        assert_eq!(
            RestartTarget::resolve(&store, "ns1", "auth").await.unwrap(),
            RestartTarget::unit("ns1", "app=auth")
        );

        store.seed(deployment(1, 1)).unwrap();
        assert_eq!(
            RestartTarget::resolve(&store, "ns1", "auth").await.unwrap(),
            RestartTarget::deployment("ns1", "auth")
        );
    }
}
