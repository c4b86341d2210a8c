//! # Secret Codec
//!
//! The bootstrap record has a fixed set of named fields. On the cluster every value is
//! stored as raw bytes in an Opaque Secret, which the API hands back base64-encoded: that
//! encoded form is [`EncodedConfiguration`]. Templates that write Secret `data` consume
//! it as-is; everything else consumes the plain-text [`DecodedConfiguration`].
//!
//! Fields are enumerated statically by [`BootstrapField`], so a decode failure always
//! names the field and never yields a partially decoded record.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Lookup of template placeholder names
pub trait TemplateContext: Sync {
    /// Value for a placeholder, or `None` when the context has no such field
    fn lookup(&self, field: &str) -> Option<&str>;
}

/// Context with no fields, for manifests that must not contain placeholders
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticContext;

impl TemplateContext for StaticContext {
    fn lookup(&self, _field: &str) -> Option<&str> {
        None
    }
}

/// Named fields of the bootstrap record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BootstrapField {
    Realm,
    ClientId,
    ClientSecret,
    DiscoveryEndpoint,
    PgPassword,
    DefaultAudValue,
    DefaultIdpValue,
    DefaultRealmValue,
    SreMcspGroupsToken,
    GlobalRealmValue,
    GlobalAccountIdp,
    GlobalAccountAud,
    UserValidationApiV2,
    IamHostUrl,
    AccountIamUrl,
    AccountIamNamespace,
}

impl BootstrapField {
    pub const ALL: [BootstrapField; 16] = [
        BootstrapField::Realm,
        BootstrapField::ClientId,
        BootstrapField::ClientSecret,
        BootstrapField::DiscoveryEndpoint,
        BootstrapField::PgPassword,
        BootstrapField::DefaultAudValue,
        BootstrapField::DefaultIdpValue,
        BootstrapField::DefaultRealmValue,
        BootstrapField::SreMcspGroupsToken,
        BootstrapField::GlobalRealmValue,
        BootstrapField::GlobalAccountIdp,
        BootstrapField::GlobalAccountAud,
        BootstrapField::UserValidationApiV2,
        BootstrapField::IamHostUrl,
        BootstrapField::AccountIamUrl,
        BootstrapField::AccountIamNamespace,
    ];

    /// Key in the stored Secret and name used by template placeholders
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            BootstrapField::Realm => "Realm",
            BootstrapField::ClientId => "ClientID",
            BootstrapField::ClientSecret => "ClientSecret",
            BootstrapField::DiscoveryEndpoint => "DiscoveryEndpoint",
            BootstrapField::PgPassword => "PGPassword",
            BootstrapField::DefaultAudValue => "DefaultAUDValue",
            BootstrapField::DefaultIdpValue => "DefaultIDPValue",
            BootstrapField::DefaultRealmValue => "DefaultRealmValue",
            BootstrapField::SreMcspGroupsToken => "SREMCSPGroupsToken",
            BootstrapField::GlobalRealmValue => "GlobalRealmValue",
            BootstrapField::GlobalAccountIdp => "GlobalAccountIDP",
            BootstrapField::GlobalAccountAud => "GlobalAccountAud",
            BootstrapField::UserValidationApiV2 => "UserValidationAPIV2",
            BootstrapField::IamHostUrl => "IAMHOSTURL",
            BootstrapField::AccountIamUrl => "AccountIAMURL",
            BootstrapField::AccountIamNamespace => "AccountIAMNamespace",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// Whether the field is written to the stored record
    ///
    /// `AccountIAMURL` is derived from the operand route on every cycle instead.
    #[must_use]
    pub fn is_persisted(self) -> bool {
        self != BootstrapField::AccountIamUrl
    }

    pub fn persisted() -> impl Iterator<Item = BootstrapField> {
        Self::ALL.into_iter().filter(|field| field.is_persisted())
    }
}

impl fmt::Display for BootstrapField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Value storage shared by both projections
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BootstrapConfiguration {
    realm: String,
    client_id: String,
    client_secret: String,
    discovery_endpoint: String,
    pg_password: String,
    default_aud_value: String,
    default_idp_value: String,
    default_realm_value: String,
    sre_mcsp_groups_token: String,
    global_realm_value: String,
    global_account_idp: String,
    global_account_aud: String,
    user_validation_api_v2: String,
    iam_host_url: String,
    account_iam_url: String,
    account_iam_namespace: String,
}

impl BootstrapConfiguration {
    pub fn get(&self, field: BootstrapField) -> &str {
        match field {
            BootstrapField::Realm => &self.realm,
            BootstrapField::ClientId => &self.client_id,
            BootstrapField::ClientSecret => &self.client_secret,
            BootstrapField::DiscoveryEndpoint => &self.discovery_endpoint,
            BootstrapField::PgPassword => &self.pg_password,
            BootstrapField::DefaultAudValue => &self.default_aud_value,
            BootstrapField::DefaultIdpValue => &self.default_idp_value,
            BootstrapField::DefaultRealmValue => &self.default_realm_value,
            BootstrapField::SreMcspGroupsToken => &self.sre_mcsp_groups_token,
            BootstrapField::GlobalRealmValue => &self.global_realm_value,
            BootstrapField::GlobalAccountIdp => &self.global_account_idp,
            BootstrapField::GlobalAccountAud => &self.global_account_aud,
            BootstrapField::UserValidationApiV2 => &self.user_validation_api_v2,
            BootstrapField::IamHostUrl => &self.iam_host_url,
            BootstrapField::AccountIamUrl => &self.account_iam_url,
            BootstrapField::AccountIamNamespace => &self.account_iam_namespace,
        }
    }

    pub fn set(&mut self, field: BootstrapField, value: impl Into<String>) {
        let slot = match field {
            BootstrapField::Realm => &mut self.realm,
            BootstrapField::ClientId => &mut self.client_id,
            BootstrapField::ClientSecret => &mut self.client_secret,
            BootstrapField::DiscoveryEndpoint => &mut self.discovery_endpoint,
            BootstrapField::PgPassword => &mut self.pg_password,
            BootstrapField::DefaultAudValue => &mut self.default_aud_value,
            BootstrapField::DefaultIdpValue => &mut self.default_idp_value,
            BootstrapField::DefaultRealmValue => &mut self.default_realm_value,
            BootstrapField::SreMcspGroupsToken => &mut self.sre_mcsp_groups_token,
            BootstrapField::GlobalRealmValue => &mut self.global_realm_value,
            BootstrapField::GlobalAccountIdp => &mut self.global_account_idp,
            BootstrapField::GlobalAccountAud => &mut self.global_account_aud,
            BootstrapField::UserValidationApiV2 => &mut self.user_validation_api_v2,
            BootstrapField::IamHostUrl => &mut self.iam_host_url,
            BootstrapField::AccountIamUrl => &mut self.account_iam_url,
            BootstrapField::AccountIamNamespace => &mut self.account_iam_namespace,
        };
        slot.zeroize();
        *slot = value.into();
    }
}

impl fmt::Debug for BootstrapConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values are credentials; only report which fields are populated
        let populated: Vec<&str> = BootstrapField::ALL
            .into_iter()
            .filter(|field| !self.get(*field).is_empty())
            .map(BootstrapField::key)
            .collect();
        f.debug_struct("BootstrapConfiguration")
            .field("populated", &populated)
            .finish_non_exhaustive()
    }
}

/// Bootstrap record with every value base64-encoded, as stored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedConfiguration(BootstrapConfiguration);

/// Bootstrap record in plain text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedConfiguration(BootstrapConfiguration);

impl EncodedConfiguration {
    pub fn get(&self, field: BootstrapField) -> &str {
        self.0.get(field)
    }

    /// Set an already-encoded value
    pub fn set(&mut self, field: BootstrapField, encoded: impl Into<String>) {
        self.0.set(field, encoded);
    }
}

impl DecodedConfiguration {
    pub fn get(&self, field: BootstrapField) -> &str {
        self.0.get(field)
    }

    pub fn set(&mut self, field: BootstrapField, value: impl Into<String>) {
        self.0.set(field, value);
    }
}

impl TemplateContext for EncodedConfiguration {
    fn lookup(&self, field: &str) -> Option<&str> {
        BootstrapField::from_key(field).map(|f| self.get(f))
    }
}

impl TemplateContext for DecodedConfiguration {
    fn lookup(&self, field: &str) -> Option<&str> {
        BootstrapField::from_key(field).map(|f| self.get(f))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bootstrap field {field} is not valid base64: {reason}")]
    InvalidEncoding { field: BootstrapField, reason: String },
    #[error("bootstrap field {field} does not decode to UTF-8 text")]
    InvalidText { field: BootstrapField },
}

#[derive(Debug, Error)]
#[error("secure random source unavailable: {0}")]
pub struct EntropyError(String);

pub fn encode(value: &str) -> String {
    BASE64_STANDARD.encode(value.as_bytes())
}

pub fn decode(field: BootstrapField, encoded: &str) -> Result<String, DecodeError> {
    let bytes = BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| DecodeError::InvalidEncoding {
            field,
            reason: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidText { field })
}

/// Encode every field
pub fn encode_all(record: &DecodedConfiguration) -> EncodedConfiguration {
    let mut encoded = EncodedConfiguration::default();
    for field in BootstrapField::ALL {
        encoded.set(field, encode(record.get(field)));
    }
    encoded
}

/// Decode every field, or fail naming the first malformed one
///
/// Nothing decoded is returned unless every field decodes.
pub fn decode_all(record: &EncodedConfiguration) -> Result<DecodedConfiguration, DecodeError> {
    let mut decoded = DecodedConfiguration::default();
    for field in BootstrapField::ALL {
        decoded.set(field, decode(field, record.get(field))?);
    }
    Ok(decoded)
}

/// Random token: `length_bytes` of OS randomness, base64-encoded twice
///
/// The random buffer and the intermediate encoding are wiped before returning.
pub fn generate(length_bytes: usize) -> Result<Zeroizing<String>, EntropyError> {
    let mut random = Zeroizing::new(vec![0u8; length_bytes]);
    OsRng
        .try_fill_bytes(&mut random)
        .map_err(|e| EntropyError(e.to_string()))?;
    let once = Zeroizing::new(BASE64_STANDARD.encode(random.as_slice()));
    Ok(Zeroizing::new(BASE64_STANDARD.encode(once.as_bytes())))
}
