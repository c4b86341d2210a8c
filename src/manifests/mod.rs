//! # Manifest Catalogue
//!
//! The operand is described by inert YAML documents under `manifests/`, compiled into the
//! binary. Each document is a [`ResourceSpecification`]: its template text plus the kind and
//! name it must render to. Documents are grouped in the order the reconciler applies them;
//! order inside a group is significant and is never changed.
//!
//! Placeholders use `{{ .FieldName }}` and are resolved against the context named by the
//! group's [`Injection`].

/// Values a group's placeholders are resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// No placeholders allowed
    Static,
    /// Bootstrap record as persisted (base64 values), for Secret `data`
    Encoded,
    /// Bootstrap record decoded to plain text
    Decoded,
    /// UI configuration derived from the cluster
    Ui,
}

/// A template paired with the identity it must render to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSpecification {
    pub kind: &'static str,
    pub name: &'static str,
    /// Position inside the group
    pub ordinal: u16,
    pub template: &'static str,
}

/// An ordered set of specifications sharing one injection context
#[derive(Debug, Clone, Copy)]
pub struct ManifestGroup {
    pub name: &'static str,
    pub injection: Injection,
    pub resources: &'static [ResourceSpecification],
}

macro_rules! manifest {
    ($ordinal:literal, $kind:literal, $name:literal, $path:literal) => {
        ResourceSpecification {
            kind: $kind,
            name: $name,
            ordinal: $ordinal,
            template: include_str!(concat!("../../manifests/", $path)),
        }
    };
}

/// Database initialisation job, run once per cycle after stale jobs are removed
pub static DB_BOOTSTRAP: ManifestGroup = ManifestGroup {
    name: "db_bootstrap",
    injection: Injection::Static,
    resources: &[manifest!(
        0,
        "Job",
        "create-account-iam-db",
        "bootstrap/create-account-iam-db.yaml"
    )],
};

pub static APP_SECRETS: ManifestGroup = ManifestGroup {
    name: "app_secrets",
    injection: Injection::Encoded,
    resources: &[
        manifest!(
            0,
            "Secret",
            "account-iam-oidc-client-auth",
            "secrets/account-iam-oidc-client-auth.yaml"
        ),
        manifest!(1, "Secret", "account-iam-okd-auth", "secrets/account-iam-okd-auth.yaml"),
        manifest!(
            2,
            "Secret",
            "account-iam-database-secret",
            "secrets/account-iam-database-secret.yaml"
        ),
        manifest!(
            3,
            "Secret",
            "account-iam-mpconfig-secrets",
            "secrets/account-iam-mpconfig-secrets.yaml"
        ),
    ],
};

pub static APP_CONFIGS: ManifestGroup = ManifestGroup {
    name: "app_configs",
    injection: Injection::Decoded,
    resources: &[manifest!(
        0,
        "Secret",
        "account-im-db-password",
        "configs/account-im-db-password.yaml"
    )],
};

pub static APP_STATIC: ManifestGroup = ManifestGroup {
    name: "app_static",
    injection: Injection::Static,
    resources: &[
        manifest!(
            0,
            "NetworkPolicy",
            "account-iam-ingress-allow",
            "operand/account-iam-ingress-allow.yaml"
        ),
        manifest!(
            1,
            "NetworkPolicy",
            "account-iam-egress-allow",
            "operand/account-iam-egress-allow.yaml"
        ),
        manifest!(
            2,
            "ConfigMap",
            "account-iam-env-configmap-dev",
            "operand/account-iam-env-configmap-dev.yaml"
        ),
        manifest!(3, "ConfigMap", "account-iam", "operand/account-iam-configmap.yaml"),
        manifest!(
            4,
            "ServiceAccount",
            "account-iam-migration",
            "operand/account-iam-migration-sa.yaml"
        ),
        manifest!(
            5,
            "Job",
            "account-iam-db-migration-mcspid",
            "operand/account-iam-db-migration-mcspid.yaml"
        ),
        manifest!(
            6,
            "WebSphereLibertyApplication",
            "account-iam",
            "operand/account-iam-app.yaml"
        ),
    ],
};

pub static CERT_ROTATION: ManifestGroup = ManifestGroup {
    name: "cert_rotation",
    injection: Injection::Static,
    resources: &[
        manifest!(0, "Role", "msp-iam-cert-rotation-role", "cert_rotation/role.yaml"),
        manifest!(
            1,
            "Role",
            "msp-iam-cert-rotation-role-development",
            "cert_rotation/role-development.yaml"
        ),
        manifest!(
            2,
            "RoleBinding",
            "msp-iam-cert-rotation-rb",
            "cert_rotation/rolebinding.yaml"
        ),
        manifest!(
            3,
            "RoleBinding",
            "msp-iam-cert-rotation-rb-development",
            "cert_rotation/rolebinding-development.yaml"
        ),
        manifest!(
            4,
            "ServiceAccount",
            "msp-iam-cert-rotation-sa",
            "cert_rotation/serviceaccount.yaml"
        ),
        manifest!(
            5,
            "Deployment",
            "iam-cert-rotation-manager",
            "cert_rotation/deployment.yaml"
        ),
    ],
};

pub static UI_STATIC: ManifestGroup = ManifestGroup {
    name: "ui_static",
    injection: Injection::Static,
    resources: &[
        manifest!(
            0,
            "Issuer",
            "account-iam-ui-selfsigned-issuer",
            "ui/issuer-selfsigned.yaml"
        ),
        manifest!(
            1,
            "Certificate",
            "account-iam-ui-selfsigned-ca-cert",
            "ui/certificate-ca.yaml"
        ),
        manifest!(
            2,
            "Issuer",
            "account-iam-ui-product-reg-ca-issuer",
            "ui/issuer-ca.yaml"
        ),
        manifest!(
            3,
            "Service",
            "account-iam-ui-api-service-onprem",
            "ui/service-api.yaml"
        ),
        manifest!(
            4,
            "Service",
            "account-iam-ui-instance-service-onprem",
            "ui/service-instance.yaml"
        ),
        manifest!(
            5,
            "Deployment",
            "account-iam-ui-api-deployment-onprem",
            "ui/deployment-api.yaml"
        ),
        manifest!(
            6,
            "Deployment",
            "account-iam-ui-instance-deployment-onprem",
            "ui/deployment-instance.yaml"
        ),
    ],
};

pub static IM_CONFIG: ManifestGroup = ManifestGroup {
    name: "im_config",
    injection: Injection::Decoded,
    resources: &[
        manifest!(0, "ServiceAccount", "mcsp-utils", "im_config/serviceaccount.yaml"),
        manifest!(1, "Role", "mcsp-utils", "im_config/role.yaml"),
        manifest!(2, "RoleBinding", "mcsp-utils", "im_config/rolebinding.yaml"),
        manifest!(3, "Job", "mcsp-im-config-job", "im_config/job.yaml"),
    ],
};

pub static UI_TEMPLATES: ManifestGroup = ManifestGroup {
    name: "ui_templates",
    injection: Injection::Ui,
    resources: &[
        manifest!(
            0,
            "Certificate",
            "account-iam-ui-server-cert",
            "ui/certificate-server.yaml"
        ),
        manifest!(
            1,
            "ConfigMap",
            "account-iam-ui-config-onprem",
            "ui/configmap.yaml"
        ),
        manifest!(2, "Secret", "account-iam-ui-secrets-onprem", "ui/secret.yaml"),
        manifest!(3, "Ingress", "account-iam-ui-ingress-onprem", "ui/ingress-api.yaml"),
        manifest!(
            4,
            "Ingress",
            "account-iam-ui-instance-ingress-onprem",
            "ui/ingress-instance.yaml"
        ),
    ],
};

/// Groups applied by the core stage, in order
pub fn core_groups() -> [&'static ManifestGroup; 6] {
    [
        &DB_BOOTSTRAP,
        &APP_SECRETS,
        &APP_CONFIGS,
        &APP_STATIC,
        &CERT_ROTATION,
        &UI_STATIC,
    ]
}

/// Every group in the catalogue
pub fn all_groups() -> [&'static ManifestGroup; 8] {
    [
        &DB_BOOTSTRAP,
        &APP_SECRETS,
        &APP_CONFIGS,
        &APP_STATIC,
        &CERT_ROTATION,
        &UI_STATIC,
        &IM_CONFIG,
        &UI_TEMPLATES,
    ]
}
