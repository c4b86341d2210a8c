//! # Dependent Integration
//!
//! Values derived from objects other components publish: the operand and console routes,
//! the cluster-info ConfigMap, and the identity provider's issuer. Reading them is
//! separated from writing so each rule can be checked on plain objects.

use crate::controller::reconciler::codec::{BootstrapField, DecodedConfiguration, TemplateContext};
use kube::core::DynamicObject;
use serde_json::Value;
use std::fmt;

const DEFAULT_NODE_ENV: &str = "production";
const DEFAULT_CERT_DIR: &str = "../../security";
const DEFAULT_CONFIG_ENV: &str = "dev";
const DEFAULT_DEPLOYMENT_CLOUD: &str = "IBM_CLOUD";
const DEFAULT_ON_PREM_ACCOUNT: &str = "mcsp-im-intgn-account";
const PENDING_REDIS: &str = "placeholder value until onprem Redis integration done";
const PENDING_API_KEY: &str = "placeholder value until logic is added to retrieve from IM job";
const PENDING_SESSION_SECRET: &str = "placeholder value because we do not know what this is for yet";

/// `spec.host` of a Route
pub fn route_host(route: &DynamicObject) -> Option<&str> {
    route
        .data
        .pointer("/spec/host")
        .and_then(Value::as_str)
        .filter(|host| !host.is_empty())
}

/// A string entry of a ConfigMap's `data`
pub fn config_map_value<'a>(config_map: &'a DynamicObject, key: &str) -> Option<&'a str> {
    config_map
        .data
        .get("data")
        .and_then(|data| data.get(key))
        .and_then(Value::as_str)
}

/// Rewrite the issuer of the identity provider ConfigMap when it differs
///
/// Returns `true` when `config_map` was changed and has to be written back.
pub fn align_issuer(config_map: &mut DynamicObject, key: &str, issuer: &str) -> bool {
    if config_map_value(config_map, key) == Some(issuer) {
        return false;
    }
    if !config_map.data.get("data").is_some_and(Value::is_object) {
        config_map.data["data"] = Value::Object(serde_json::Map::new());
    }
    config_map.data["data"][key] = Value::from(issuer);
    true
}

/// Component names in the comma-separated `annotation`, in order, without duplicates
pub fn pending_restarts(object: &DynamicObject, annotation: &str) -> Vec<String> {
    let mut pending: Vec<String> = Vec::new();
    let listed = object
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(annotation));
    for name in listed.into_iter().flat_map(|value| value.split(',')) {
        let name = name.trim();
        if !name.is_empty() && !pending.iter().any(|p| p == name) {
            pending.push(name.to_string());
        }
    }
    pending
}

/// Record `pending` in `annotation`; an empty list removes it
pub fn set_pending_restarts<S: AsRef<str>>(
    object: &mut DynamicObject,
    annotation: &str,
    pending: &[S],
) {
    if pending.is_empty() {
        if let Some(annotations) = object.metadata.annotations.as_mut() {
            annotations.remove(annotation);
        }
        return;
    }
    let value = pending
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",");
    object
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(annotation.to_string(), value);
}

/// Endpoints published in `ibmcloud-cluster-info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub apiserver_host: String,
    pub endpoint: String,
}

impl ClusterInfo {
    /// Read the two required keys; the error names the missing one
    pub fn from_config_map(config_map: &DynamicObject) -> Result<Self, String> {
        let required = |key: &str| {
            config_map_value(config_map, key)
                .map(str::to_string)
                .ok_or_else(|| format!("missing field '{key}'"))
        };
        Ok(Self {
            apiserver_host: required("cluster_kube_apiserver_host")?,
            endpoint: required("cluster_endpoint")?,
        })
    }

    /// Apiserver host without its first label: `api.example.com` becomes `example.com`
    pub fn domain(&self) -> &str {
        self.apiserver_host
            .split_once('.')
            .map_or("", |(_, domain)| domain)
    }
}

/// Values injected into the UI manifests
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UiConfiguration {
    pub hostname: String,
    pub instance_management_hostname: String,
    pub iam_api: String,
    pub issuer_base_url: String,
    pub im_id_mgmt: String,
    pub csidp_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub node_env: String,
    pub cert_dir: String,
    pub config_env: String,
    pub deployment_cloud: String,
    pub on_prem_account: String,
    pub redis_host: String,
    pub redis_ca: String,
    pub session_secret: String,
    pub iam_global_api_key: String,
    pub disable_redis: String,
    pub account_api: String,
    pub product_api: String,
    pub metering_api: String,
    pub instance_api: String,
    pub subscription_api: String,
    pub api_oauth_token_url: String,
    pub api_oauth_client_id: String,
    pub api_oauth_client_secret: String,
    pub my_ibm_url: String,
    pub aws_provisioning_url: String,
    pub ibm_cloud_provisioning_url: String,
    pub product_registration_username: String,
    pub product_registration_password: String,
}

impl UiConfiguration {
    pub fn derive(namespace: &str, cluster: &ClusterInfo, decoded: &DecodedConfiguration) -> Self {
        let domain = cluster.domain();
        let endpoint = cluster.endpoint.as_str();
        Self {
            hostname: format!("account-iam-ui-inst-main-{namespace}.apps.{domain}"),
            instance_management_hostname: format!("account-iam-ui-inst-{namespace}.apps.{domain}"),
            iam_api: format!("https://account-iam-{namespace}.apps.{domain}"),
            issuer_base_url: format!("{endpoint}/idprovider/v1/auth"),
            im_id_mgmt: endpoint.to_string(),
            csidp_url: format!("{endpoint}/common-nav/identity-access/realms"),
            client_id: decoded.get(BootstrapField::ClientId).to_string(),
            client_secret: decoded.get(BootstrapField::ClientSecret).to_string(),
            node_env: DEFAULT_NODE_ENV.to_string(),
            cert_dir: DEFAULT_CERT_DIR.to_string(),
            config_env: DEFAULT_CONFIG_ENV.to_string(),
            deployment_cloud: DEFAULT_DEPLOYMENT_CLOUD.to_string(),
            on_prem_account: DEFAULT_ON_PREM_ACCOUNT.to_string(),
            redis_host: PENDING_REDIS.to_string(),
            redis_ca: PENDING_REDIS.to_string(),
            session_secret: PENDING_SESSION_SECRET.to_string(),
            iam_global_api_key: PENDING_API_KEY.to_string(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for UiConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiConfiguration")
            .field("hostname", &self.hostname)
            .field("instance_management_hostname", &self.instance_management_hostname)
            .field("iam_api", &self.iam_api)
            .finish_non_exhaustive()
    }
}

impl TemplateContext for UiConfiguration {
    fn lookup(&self, field: &str) -> Option<&str> {
        let value = match field {
            "Hostname" => &self.hostname,
            "InstanceManagementHostname" => &self.instance_management_hostname,
            "IAMAPI" => &self.iam_api,
            "IssuerBaseURL" => &self.issuer_base_url,
            "IMIDMgmt" => &self.im_id_mgmt,
            "CSIDPURL" => &self.csidp_url,
            "ClientID" => &self.client_id,
            "ClientSecret" => &self.client_secret,
            "NodeEnv" => &self.node_env,
            "CertDir" => &self.cert_dir,
            "ConfigEnv" => &self.config_env,
            "DeploymentCloud" => &self.deployment_cloud,
            "OnPremAccount" => &self.on_prem_account,
            "RedisHost" => &self.redis_host,
            "RedisCA" => &self.redis_ca,
            "SessionSecret" => &self.session_secret,
            "IAMGlobalAPIKey" => &self.iam_global_api_key,
            "DisableRedis" => &self.disable_redis,
            "AccountAPI" => &self.account_api,
            "ProductAPI" => &self.product_api,
            "MeteringAPI" => &self.metering_api,
            "InstanceAPI" => &self.instance_api,
            "SubscriptionAPI" => &self.subscription_api,
            "APIOAUTHTokenURL" => &self.api_oauth_token_url,
            "APIOAUTHClientID" => &self.api_oauth_client_id,
            "APIOAUTHClientSecret" => &self.api_oauth_client_secret,
            "MyIBMURL" => &self.my_ibm_url,
            "AWSProvisioningURL" => &self.aws_provisioning_url,
            "IBMCloudProvisioningURL" => &self.ibm_cloud_provisioning_url,
            "ProductRegistrationUsername" => &self.product_registration_username,
            "ProductRegistrationPassword" => &self.product_registration_password,
            _ => return None,
        };
        Some(value.as_str())
    }
}
