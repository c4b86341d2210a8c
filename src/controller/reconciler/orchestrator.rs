//! # Reconcile Orchestrator
//!
//! Drives one cycle for an `AccountIAM` instance through its stages:
//!
//! 1. **FetchInstance** - read the instance; absent or suspended ends the cycle quietly
//! 2. **VerifyPrerequisites** - EDB and WebSphere Liberty operators must be installed
//! 3. **EstablishBootstrap** - fetch or generate `user-mgmt-bootstrap`, clear one-shot Jobs
//! 4. **ApplyCoreResources** - catalogue groups in order, then align the issuer URL
//! 5. **ConfigureDependentIntegration** - IM config job and UI resources
//! 6. **RestartAffectedComponents** - cycle the identity pods owed a restart
//!
//! The first failing stage aborts the cycle; retrying is left to the controller's
//! error policy. The cancellation token is checked between stages and between groups.
//!
//! Rewriting the issuer also records the components to restart in the
//! `operator.ibm.com/pending-restarts` annotation of the same ConfigMap, in the same
//! write. Restarts are read back from that annotation and each name is dropped only once
//! its component is ready, so a cycle aborted anywhere after the rewrite still restarts
//! them on the next attempt.

use crate::constants::{
    ACCOUNT_IAM_ROUTE, CLUSTER_INFO_CONFIGMAP, CP_CONSOLE_ROUTE, IDP_CONFIGMAP,
    ISSUER_RESTART_TARGETS, OIDC_ISSUER_URL_KEY, PASSWORD_LENGTH_BYTES,
    PENDING_RESTARTS_ANNOTATION,
};
use crate::controller::reconciler::apply::{ApplyEngine, ApplyOutcome, Owner};
use crate::controller::reconciler::bootstrap::{BootstrapError, BootstrapSecretManager};
use crate::controller::reconciler::codec::{
    decode_all, generate, BootstrapField, DecodedConfiguration, EncodedConfiguration,
    StaticContext, TemplateContext,
};
use crate::controller::reconciler::integration::{
    align_issuer, pending_restarts, route_host, set_pending_restarts, ClusterInfo,
    UiConfiguration,
};
use crate::controller::reconciler::probe::{self, PREREQUISITES};
use crate::controller::reconciler::restart::{
    RestartCoordinator, RestartError, RestartOutcome, RestartSettings, RestartTarget,
};
use crate::controller::reconciler::template::render_all;
use crate::controller::reconciler::types::{CycleError, Stage};
use crate::manifests::{self, Injection, ManifestGroup};
use crate::observability;
use crate::store::{ResourceKind, ResourceStore, StoreError};
use kube::core::DynamicObject;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Result of one cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    /// The cycle failed and should be retried
    pub requeue: bool,
    pub error: Option<CycleError>,
    /// Last stage entered; `Done` after a complete cycle
    pub stage: Option<Stage>,
    pub instance_found: bool,
    pub suspended: bool,
    pub bootstrap_created: bool,
    pub resources_created: usize,
    pub resources_updated: usize,
    /// Components restarted and observed ready
    pub restarted: Vec<String>,
}

impl CycleReport {
    #[must_use]
    pub fn completed(&self) -> bool {
        self.stage == Some(Stage::Done)
    }

    fn record(&mut self, outcomes: &[ApplyOutcome]) {
        for outcome in outcomes {
            match outcome {
                ApplyOutcome::Created => self.resources_created += 1,
                ApplyOutcome::Updated => self.resources_updated += 1,
            }
        }
    }
}

/// Template contexts available to a stage
struct Contexts<'c> {
    encoded: &'c EncodedConfiguration,
    decoded: &'c DecodedConfiguration,
    ui: Option<&'c UiConfiguration>,
}

impl Contexts<'_> {
    fn for_group(&self, group: &ManifestGroup) -> &dyn TemplateContext {
        match group.injection {
            Injection::Static => &StaticContext,
            Injection::Encoded => self.encoded,
            Injection::Decoded => self.decoded,
            Injection::Ui => match self.ui {
                Some(ui) => ui,
                None => &StaticContext,
            },
        }
    }
}

pub struct ReconcileOrchestrator {
    store: Arc<dyn ResourceStore>,
    restart: RestartSettings,
}

impl std::fmt::Debug for ReconcileOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileOrchestrator")
            .field("restart", &self.restart)
            .finish_non_exhaustive()
    }
}

impl ReconcileOrchestrator {
    pub fn new(store: Arc<dyn ResourceStore>, restart: RestartSettings) -> Self {
        Self { store, restart }
    }

    /// Run one cycle for `namespace/name`
    pub async fn run(&self, namespace: &str, name: &str, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();
        let span = info_span!(
            "reconcile.cycle",
            resource.namespace = namespace,
            resource.name = name
        );
        if let Err(error) = self
            .execute(namespace, name, cancel, &mut report)
            .instrument(span)
            .await
        {
            warn!(
                resource.namespace = namespace,
                resource.name = name,
                class = error.class().as_str(),
                "Cycle aborted: {}",
                error
            );
            report.requeue = true;
            report.error = Some(error);
        }
        report
    }

    async fn execute(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) -> Result<(), CycleError> {
        enter(report, Stage::FetchInstance, cancel)?;
        let Some(instance) = self
            .fetch_instance(namespace, name)
            .instrument(stage_span(Stage::FetchInstance))
            .await?
        else {
            debug!(namespace, name, "Instance not found, nothing to reconcile");
            return Ok(());
        };
        report.instance_found = true;
        if is_suspended(&instance) {
            info!(namespace, name, "Reconciliation suspended");
            report.suspended = true;
            return Ok(());
        }
        let owner = Owner::of(&instance).map_err(|e| CycleError::from_store(Stage::FetchInstance, e))?;

        enter(report, Stage::VerifyPrerequisites, cancel)?;
        self.verify_prerequisites()
            .instrument(stage_span(Stage::VerifyPrerequisites))
            .await?;

        enter(report, Stage::EstablishBootstrap, cancel)?;
        let (encoded, mut decoded) = self
            .establish_bootstrap(namespace, report)
            .instrument(stage_span(Stage::EstablishBootstrap))
            .await?;

        enter(report, Stage::ApplyCoreResources, cancel)?;
        self.apply_core_resources(&owner, &encoded, &decoded, cancel, report)
            .instrument(stage_span(Stage::ApplyCoreResources))
            .await?;

        enter(report, Stage::ConfigureDependentIntegration, cancel)?;
        self.configure_dependent_integration(&owner, &encoded, &mut decoded, cancel, report)
            .instrument(stage_span(Stage::ConfigureDependentIntegration))
            .await?;

        enter(report, Stage::RestartAffectedComponents, cancel)?;
        self.restart_affected_components(namespace, cancel, report)
            .instrument(stage_span(Stage::RestartAffectedComponents))
            .await?;

        report.stage = Some(Stage::Done);
        info!(
            namespace,
            name,
            created = report.resources_created,
            updated = report.resources_updated,
            restarted = report.restarted.len(),
            "✅ Cycle complete"
        );
        Ok(())
    }

    async fn fetch_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, CycleError> {
        self.store
            .get(&ResourceKind::account_iam(), namespace, name)
            .await
            .map_err(|e| CycleError::from_store(Stage::FetchInstance, e))
    }

    async fn verify_prerequisites(&self) -> Result<(), CycleError> {
        let missing = probe::first_missing(self.store.as_ref(), &PREREQUISITES)
            .await
            .map_err(|e| CycleError::from_store(Stage::VerifyPrerequisites, e))?;
        match missing {
            Some(prerequisite) => Err(CycleError::PrerequisiteMissing {
                api_group_version: prerequisite.api_group_version.to_string(),
                kind: prerequisite.kind.to_string(),
                provider: prerequisite.provider.to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn establish_bootstrap(
        &self,
        namespace: &str,
        report: &mut CycleReport,
    ) -> Result<(EncodedConfiguration, DecodedConfiguration), CycleError> {
        const STAGE: Stage = Stage::EstablishBootstrap;

        let password = generate(PASSWORD_LENGTH_BYTES)
            .map_err(|e| CycleError::data_integrity(STAGE, e))?;
        let console = self
            .require(&ResourceKind::route(), namespace, CP_CONSOLE_ROUTE, STAGE)
            .await?;
        let host = route_host(&console).ok_or_else(|| {
            CycleError::data_integrity(STAGE, format!("route {CP_CONSOLE_ROUTE} has no spec.host"))
        })?;

        let manager = BootstrapSecretManager::new(self.store.as_ref());
        let (encoded, created) = manager
            .ensure(namespace, &password, host)
            .await
            .map_err(|e| match e {
                BootstrapError::Store(e) => CycleError::from_store(STAGE, e),
                other => CycleError::data_integrity(STAGE, other),
            })?;
        if created {
            observability::metrics::increment_bootstrap_generated();
            report.bootstrap_created = true;
        }

        manager
            .cleanup_stale_jobs(namespace)
            .await
            .map_err(|e| CycleError::from_store(STAGE, e))?;

        let decoded = decode_all(&encoded).map_err(|e| CycleError::data_integrity(STAGE, e))?;
        Ok((encoded, decoded))
    }

    /// Apply the core groups, then align the issuer and mark its consumers for restart
    async fn apply_core_resources(
        &self,
        owner: &Owner,
        encoded: &EncodedConfiguration,
        decoded: &DecodedConfiguration,
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) -> Result<(), CycleError> {
        const STAGE: Stage = Stage::ApplyCoreResources;
        let contexts = Contexts {
            encoded,
            decoded,
            ui: None,
        };

        for group in manifests::core_groups() {
            checkpoint(cancel, STAGE)?;
            self.apply_group(owner, group, contexts.for_group(group), STAGE, report)
                .await?;
        }

        checkpoint(cancel, STAGE)?;
        let namespace = owner.namespace.as_str();
        let mut idp = self
            .require(&ResourceKind::config_map(), namespace, IDP_CONFIGMAP, STAGE)
            .await?;
        let issuer = decoded.get(BootstrapField::DefaultIdpValue);
        if !align_issuer(&mut idp, OIDC_ISSUER_URL_KEY, issuer) {
            debug!(namespace, "Issuer URL already up to date");
            return Ok(());
        }

        let mut pending = pending_restarts(&idp, PENDING_RESTARTS_ANNOTATION);
        for app in ISSUER_RESTART_TARGETS {
            if !pending.iter().any(|p| p == app) {
                pending.push(app.to_string());
            }
        }
        set_pending_restarts(&mut idp, PENDING_RESTARTS_ANNOTATION, &pending);
        self.store
            .update(&idp)
            .await
            .map_err(|e| CycleError::from_store(STAGE, e))?;
        info!(
            namespace,
            issuer,
            pending = ?pending,
            "Updated {} in {}",
            OIDC_ISSUER_URL_KEY,
            IDP_CONFIGMAP
        );
        Ok(())
    }

    async fn configure_dependent_integration(
        &self,
        owner: &Owner,
        encoded: &EncodedConfiguration,
        decoded: &mut DecodedConfiguration,
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) -> Result<(), CycleError> {
        const STAGE: Stage = Stage::ConfigureDependentIntegration;
        let namespace = owner.namespace.as_str();

        let route = self
            .require(&ResourceKind::route(), namespace, ACCOUNT_IAM_ROUTE, STAGE)
            .await?;
        let host = route_host(&route).ok_or_else(|| {
            CycleError::data_integrity(STAGE, format!("route {ACCOUNT_IAM_ROUTE} has no spec.host"))
        })?;
        decoded.set(BootstrapField::AccountIamUrl, format!("https://{host}"));

        let contexts = Contexts {
            encoded,
            decoded,
            ui: None,
        };
        self.apply_group(
            owner,
            &manifests::IM_CONFIG,
            contexts.for_group(&manifests::IM_CONFIG),
            STAGE,
            report,
        )
        .await?;

        checkpoint(cancel, STAGE)?;
        let cluster_info = self
            .require(&ResourceKind::config_map(), namespace, CLUSTER_INFO_CONFIGMAP, STAGE)
            .await?;
        let cluster = ClusterInfo::from_config_map(&cluster_info).map_err(|reason| {
            CycleError::data_integrity(STAGE, format!("{CLUSTER_INFO_CONFIGMAP}: {reason}"))
        })?;
        let ui = UiConfiguration::derive(namespace, &cluster, contexts.decoded);
        debug!(namespace, ui = ?ui, "Derived UI configuration");

        let contexts = Contexts {
            encoded,
            decoded: contexts.decoded,
            ui: Some(&ui),
        };
        for group in [&manifests::UI_TEMPLATES, &manifests::UI_STATIC] {
            checkpoint(cancel, STAGE)?;
            self.apply_group(owner, group, contexts.for_group(group), STAGE, report)
                .await?;
        }
        Ok(())
    }

    /// Restart every component still listed on the identity provider ConfigMap
    async fn restart_affected_components(
        &self,
        namespace: &str,
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) -> Result<(), CycleError> {
        const STAGE: Stage = Stage::RestartAffectedComponents;
        let idp = self
            .require(&ResourceKind::config_map(), namespace, IDP_CONFIGMAP, STAGE)
            .await?;
        let targets = pending_restarts(&idp, PENDING_RESTARTS_ANNOTATION);
        if targets.is_empty() {
            return Ok(());
        }
        let coordinator = RestartCoordinator::new(self.store.as_ref(), self.restart);

        for app in &targets {
            checkpoint(cancel, STAGE)?;
            let target = RestartTarget::resolve(self.store.as_ref(), namespace, app)
                .await
                .map_err(|e| CycleError::from_store(STAGE, e))?;
            let outcome = coordinator.restart(&target, cancel).await.map_err(|e| match e {
                RestartError::Store(e) => CycleError::from_store(STAGE, e),
                RestartError::NoMatchingUnit {
                    namespace,
                    selector,
                } => CycleError::from_store(
                    STAGE,
                    StoreError::not_found(&ResourceKind::pod(), &namespace, &selector),
                ),
            })?;
            match outcome {
                RestartOutcome::Ready => {
                    self.clear_pending_restart(namespace, app, STAGE).await?;
                    report.restarted.push(app.clone());
                }
                RestartOutcome::TimedOut => {
                    return Err(CycleError::Timeout {
                        target: target.describe(),
                        timeout_secs: self.restart.timeout.as_secs(),
                    })
                }
                RestartOutcome::Cancelled => return Err(CycleError::Cancelled { stage: STAGE }),
            }
        }
        Ok(())
    }

    /// Drop `app` from the pending list, re-reading the ConfigMap for a fresh version
    async fn clear_pending_restart(
        &self,
        namespace: &str,
        app: &str,
        stage: Stage,
    ) -> Result<(), CycleError> {
        let mut idp = self
            .require(&ResourceKind::config_map(), namespace, IDP_CONFIGMAP, stage)
            .await?;
        let mut pending = pending_restarts(&idp, PENDING_RESTARTS_ANNOTATION);
        pending.retain(|p| p != app);
        set_pending_restarts(&mut idp, PENDING_RESTARTS_ANNOTATION, &pending);
        self.store
            .update(&idp)
            .await
            .map_err(|e| CycleError::from_store(stage, e))?;
        debug!(namespace, app, remaining = pending.len(), "Cleared pending restart");
        Ok(())
    }

    /// Render a whole group, then apply it in catalogue order
    async fn apply_group(
        &self,
        owner: &Owner,
        group: &ManifestGroup,
        context: &dyn TemplateContext,
        stage: Stage,
        report: &mut CycleReport,
    ) -> Result<(), CycleError> {
        let rendered =
            render_all(group, context).map_err(|e| CycleError::data_integrity(stage, e))?;
        let outcomes = ApplyEngine::new(self.store.as_ref(), owner)
            .apply_all(&rendered)
            .await
            .map_err(|e| CycleError::from_store(stage, e))?;
        report.record(&outcomes);
        debug!(group = group.name, applied = outcomes.len(), "Applied manifest group");
        Ok(())
    }

    /// Read an object another component is expected to publish
    async fn require(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        stage: Stage,
    ) -> Result<DynamicObject, CycleError> {
        self.store
            .get(kind, namespace, name)
            .await
            .and_then(|found| found.ok_or_else(|| StoreError::not_found(kind, namespace, name)))
            .map_err(|e| CycleError::from_store(stage, e))
    }
}

fn is_suspended(instance: &DynamicObject) -> bool {
    instance
        .data
        .pointer("/spec/suspend")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn checkpoint(cancel: &CancellationToken, stage: Stage) -> Result<(), CycleError> {
    if cancel.is_cancelled() {
        Err(CycleError::Cancelled { stage })
    } else {
        Ok(())
    }
}

fn enter(report: &mut CycleReport, stage: Stage, cancel: &CancellationToken) -> Result<(), CycleError> {
    checkpoint(cancel, stage)?;
    debug!(stage = stage.as_str(), "reconcile.stage.enter");
    report.stage = Some(stage);
    Ok(())
}

fn stage_span(stage: Stage) -> tracing::Span {
    info_span!("reconcile.stage", stage = stage.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn settings() -> RestartSettings {
        RestartSettings {
            settle: Duration::from_millis(1),
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
        }
    }

    fn instance(suspend: bool) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "operator.ibm.com/v1alpha1",
            "kind": "AccountIAM",
            "metadata": { "name": "example", "namespace": "ns1" },
            "spec": { "suspend": suspend }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_instance_ends_without_requeue() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = ReconcileOrchestrator::new(store.clone(), settings());
        let report = orchestrator
            .run("ns1", "absent", &CancellationToken::new())
            .await;
        assert!(!report.instance_found);
        assert!(!report.requeue);
        assert!(report.error.is_none());
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_suspended_instance_does_no_work() {
        let store = Arc::new(MemoryStore::new());
        store.seed(instance(true)).unwrap();
        let orchestrator = ReconcileOrchestrator::new(store.clone(), settings());
        let report = orchestrator
            .run("ns1", "example", &CancellationToken::new())
            .await;
        assert!(report.suspended);
        assert!(!report.requeue);
        assert_eq!(store.capability_queries(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_first_stage() {
        let store = Arc::new(MemoryStore::new());
        store.seed(instance(false)).unwrap();
        let orchestrator = ReconcileOrchestrator::new(store.clone(), settings());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = orchestrator.run("ns1", "example", &cancel).await;
        assert!(report.requeue);
        assert!(matches!(
            report.error,
            Some(CycleError::Cancelled {
                stage: Stage::FetchInstance
            })
        ));
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_cycle_future_is_send() {
        let orchestrator = ReconcileOrchestrator::new(Arc::new(MemoryStore::new()), settings());
        let cancel = CancellationToken::new();
        let cycle = orchestrator.run("ns1", "example", &cancel);
        assert_send(&cycle);
    }

    #[test]
    fn test_suspend_defaults_to_false() {
        let mut object = instance(false);
        object.data = json!({});
        assert!(!is_suspended(&object));
        assert!(is_suspended(&instance(true)));
    }
}
