//! # Bootstrap Secret Manager
//!
//! Owns the `user-mgmt-bootstrap` Secret: the one record that carries generated
//! credentials from cycle to cycle. An existing record is returned untouched; only a
//! missing record is generated from defaults.

use crate::constants::{BOOTSTRAP_SECRET_NAME, STALE_JOBS};
use crate::controller::reconciler::codec::{
    encode_all, BootstrapField, DecodedConfiguration, EncodedConfiguration,
};
use crate::store::{Propagation, ResourceKind, ResourceStore, StoreError};
use kube::core::DynamicObject;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("bootstrap secret {namespace}/{name} is missing field {field}")]
    MissingField {
        namespace: String,
        name: String,
        field: BootstrapField,
    },
    #[error("bootstrap secret {namespace}/{name} is malformed: {reason}")]
    Malformed {
        namespace: String,
        name: String,
        reason: String,
    },
}

/// Defaults for a freshly generated record
///
/// `host` is the cluster console route host; the password is the generated token.
pub fn defaults(namespace: &str, password: &str, host: &str) -> DecodedConfiguration {
    let idp = format!("https://{host}/idprovider/v1/auth");
    let mut record = DecodedConfiguration::default();
    record.set(BootstrapField::Realm, "PrimaryRealm");
    record.set(BootstrapField::ClientId, "mcsp-id");
    record.set(BootstrapField::ClientSecret, "mcsp-secret");
    record.set(
        BootstrapField::DiscoveryEndpoint,
        format!("https://{host}/idprovider/v1/auth/.well-known/openid-configuration"),
    );
    record.set(BootstrapField::PgPassword, password);
    record.set(BootstrapField::DefaultAudValue, "mcsp-id");
    record.set(BootstrapField::DefaultIdpValue, idp.clone());
    record.set(BootstrapField::DefaultRealmValue, "PrimaryRealm");
    record.set(BootstrapField::SreMcspGroupsToken, "mcsp-im-integration-admin");
    record.set(BootstrapField::GlobalRealmValue, "PrimaryRealm");
    record.set(BootstrapField::GlobalAccountIdp, idp);
    record.set(BootstrapField::GlobalAccountAud, "mcsp-id");
    record.set(
        BootstrapField::UserValidationApiV2,
        "https://openshift.default.svc/apis/user.openshift.io/v1/users/~",
    );
    record.set(BootstrapField::IamHostUrl, format!("https://{host}"));
    record.set(BootstrapField::AccountIamNamespace, namespace);
    record
}

/// The Secret object persisting `record`
fn to_secret(namespace: &str, record: &EncodedConfiguration) -> Result<DynamicObject, StoreError> {
    let data: Map<String, Value> = BootstrapField::persisted()
        .map(|field| (field.key().to_string(), Value::from(record.get(field))))
        .collect();
    let secret = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": BOOTSTRAP_SECRET_NAME,
            "namespace": namespace,
            "labels": { "app.kubernetes.io/managed-by": "user-management-operator" },
        },
        "type": "Opaque",
        "data": data,
    }))?;
    Ok(secret)
}

/// Read the record out of a stored Secret
fn from_secret(namespace: &str, secret: &DynamicObject) -> Result<EncodedConfiguration, BootstrapError> {
    let Some(data) = secret.data.get("data").and_then(Value::as_object) else {
        return Err(BootstrapError::Malformed {
            namespace: namespace.to_string(),
            name: BOOTSTRAP_SECRET_NAME.to_string(),
            reason: "no data section".to_string(),
        });
    };

    let mut record = EncodedConfiguration::default();
    for field in BootstrapField::persisted() {
        match data.get(field.key()) {
            Some(Value::String(value)) => record.set(field, value.as_str()),
            Some(_) => {
                return Err(BootstrapError::Malformed {
                    namespace: namespace.to_string(),
                    name: BOOTSTRAP_SECRET_NAME.to_string(),
                    reason: format!("field {field} is not a string"),
                })
            }
            None => {
                return Err(BootstrapError::MissingField {
                    namespace: namespace.to_string(),
                    name: BOOTSTRAP_SECRET_NAME.to_string(),
                    field,
                })
            }
        }
    }
    Ok(record)
}

pub struct BootstrapSecretManager<'a> {
    store: &'a dyn ResourceStore,
}

impl std::fmt::Debug for BootstrapSecretManager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapSecretManager").finish_non_exhaustive()
    }
}

impl<'a> BootstrapSecretManager<'a> {
    pub fn new(store: &'a dyn ResourceStore) -> Self {
        Self { store }
    }

    /// Fetch the record, creating it from defaults when absent
    ///
    /// A concurrent creator winning the race is not an error: the record it wrote is
    /// re-fetched and returned. The second value is `true` when this call created it.
    pub async fn ensure(
        &self,
        namespace: &str,
        generated_password: &str,
        derived_host: &str,
    ) -> Result<(EncodedConfiguration, bool), BootstrapError> {
        let kind = ResourceKind::secret();
        if let Some(existing) = self.store.get(&kind, namespace, BOOTSTRAP_SECRET_NAME).await? {
            debug!(namespace, "Bootstrap secret already exists");
            return Ok((from_secret(namespace, &existing)?, false));
        }

        let record = encode_all(&defaults(namespace, generated_password, derived_host));
        let secret = to_secret(namespace, &record)?;
        match self.store.create(&secret).await {
            Ok(_) => {
                info!(namespace, "🔐 Created bootstrap secret {}", BOOTSTRAP_SECRET_NAME);
                Ok((record, true))
            }
            Err(StoreError::AlreadyExists { .. }) => {
                info!(namespace, "Bootstrap secret was created concurrently, re-reading it");
                let existing = self
                    .store
                    .get(&kind, namespace, BOOTSTRAP_SECRET_NAME)
                    .await?
                    .ok_or_else(|| StoreError::not_found(&kind, namespace, BOOTSTRAP_SECRET_NAME))?;
                Ok((from_secret(namespace, &existing)?, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete leftover one-shot Jobs so they run again
    ///
    /// Jobs that are already gone count as deleted.
    pub async fn cleanup_stale_jobs(&self, namespace: &str) -> Result<(), StoreError> {
        let kind = ResourceKind::job();
        for job in STALE_JOBS {
            match self
                .store
                .delete(&kind, namespace, job, Propagation::Background)
                .await
            {
                Ok(()) => info!(namespace, job, "Cleaned up job"),
                Err(StoreError::NotFound { .. }) => debug!(namespace, job, "Job already gone"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::codec::decode_all;
    use crate::store::{MemoryStore, Mutation};

    #[test]
    fn test_defaults_derive_from_host() {
        let record = defaults("ns1", "cGFzcw==", "cp-console.apps.example.com");
        assert_eq!(
            record.get(BootstrapField::DefaultIdpValue),
            "https://cp-console.apps.example.com/idprovider/v1/auth"
        );
        assert_eq!(
            record.get(BootstrapField::GlobalAccountIdp),
            record.get(BootstrapField::DefaultIdpValue)
        );
        assert_eq!(
            record.get(BootstrapField::IamHostUrl),
            "https://cp-console.apps.example.com"
        );
        assert_eq!(record.get(BootstrapField::AccountIamNamespace), "ns1");
        assert_eq!(record.get(BootstrapField::PgPassword), "cGFzcw==");
        assert_eq!(record.get(BootstrapField::AccountIamUrl), "");
    }

    #[tokio::test]
    async fn test_ensure_creates_then_reuses() {
        let store = MemoryStore::new();
        let manager = BootstrapSecretManager::new(&store);

        let (first, created) = manager.ensure("ns1", "first-password", "host").await.unwrap();
        assert!(created);
        let (second, created) = manager.ensure("ns1", "second-password", "host").await.unwrap();
        assert!(!created);
        assert_eq!(first, second);

        let decoded = decode_all(&second).unwrap();
        assert_eq!(decoded.get(BootstrapField::PgPassword), "first-password");
        assert_eq!(
            store.objects_of(&ResourceKind::secret()).len(),
            1,
            "exactly one bootstrap record"
        );
    }

    #[tokio::test]
    async fn test_ensure_never_rewrites_existing_record() {
        let store = MemoryStore::new();
        let manager = BootstrapSecretManager::new(&store);
        manager.ensure("ns1", "first", "host").await.unwrap();
        store.clear_mutations();

        manager.ensure("ns1", "second", "other-host").await.unwrap();
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_reports_missing_field() {
        let store = MemoryStore::new();
        let mut record = encode_all(&defaults("ns1", "pw", "host"));
        record.set(BootstrapField::Realm, "");
        let mut secret = to_secret("ns1", &record).unwrap();
        secret.data["data"]
            .as_object_mut()
            .unwrap()
            .remove("Realm");
        store.seed(secret).unwrap();

        let err = BootstrapSecretManager::new(&store)
            .ensure("ns1", "pw", "host")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::MissingField {
                field: BootstrapField::Realm,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_jobs() {
        let store = MemoryStore::new();
        let job: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "create-account-iam-db", "namespace": "ns1" }
        }))
        .unwrap();
        store.seed(job).unwrap();

        BootstrapSecretManager::new(&store)
            .cleanup_stale_jobs("ns1")
            .await
            .unwrap();

        let mutations = store.mutations();
        assert_eq!(mutations.len(), 1);
        assert!(matches!(
            &mutations[0],
            Mutation::Delete {
                name,
                propagation: Propagation::Background,
                ..
            } if name == "create-account-iam-db"
        ));
    }
}
