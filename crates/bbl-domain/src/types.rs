use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Current schema version of the on-disk state document.
pub const STATE_VERSION: u64 = 14;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Validate an environment id against the naming rule all resource names
/// derive from: lowercase letter first, then lowercase letters, digits and
/// dashes, at most 50 characters total.
pub fn validate_env_id(s: &str) -> Result<(), DomainError> {
    let mut chars = s.chars();
    let first = chars.next().ok_or_else(|| DomainError::InvalidEnvId(s.to_string()))?;
    if !first.is_ascii_lowercase() {
        return Err(DomainError::InvalidEnvId(s.to_string()));
    }
    if s.len() > 50 {
        return Err(DomainError::InvalidEnvId(s.to_string()));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(DomainError::InvalidEnvId(s.to_string()));
    }
    Ok(())
}

// ── Enums ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Iaas {
    Aws,
    Gcp,
    Azure,
}

impl Iaas {
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "aws" => Ok(Iaas::Aws),
            "gcp" => Ok(Iaas::Gcp),
            "azure" => Ok(Iaas::Azure),
            other => Err(DomainError::InvalidIaas(other.to_string())),
        }
    }

    /// Human label for the top-level network resource, used in operator-facing
    /// messages ("vpc vpc-123 is not safe to delete…").
    pub fn network_label(&self) -> &'static str {
        match self {
            Iaas::Aws => "vpc",
            Iaas::Gcp => "network",
            Iaas::Azure => "virtual network",
        }
    }
}

impl std::fmt::Display for Iaas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Iaas::Aws => write!(f, "aws"),
            Iaas::Gcp => write!(f, "gcp"),
            Iaas::Azure => write!(f, "azure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LbKind {
    #[default]
    None,
    Concourse,
    Cf,
}

impl LbKind {
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "none" => Ok(LbKind::None),
            "concourse" => Ok(LbKind::Concourse),
            "cf" => Ok(LbKind::Cf),
            other => Err(DomainError::InvalidLbKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for LbKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LbKind::None => write!(f, "none"),
            LbKind::Concourse => write!(f, "concourse"),
            LbKind::Cf => write!(f, "cf"),
        }
    }
}

// ── Credentials ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredentials {
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpCredentials {
    /// Service account key, JSON-encoded.
    #[serde(default)]
    pub service_account_key: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureCredentials {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub region: String,
}

// ── Core structs ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
}

impl KeyPair {
    pub fn is_empty(&self) -> bool {
        self.public_key.is_empty() && self.private_key.is_empty()
    }
}

/// Jumpbox deployment bookkeeping. All fields are opaque strings maintained
/// by the BOSH installer; a non-empty `url` means a jumpbox exists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Jumpbox {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub variables: String,
    #[serde(default)]
    pub manifest: String,
    #[serde(default)]
    pub state: String,
}

impl Jumpbox {
    pub fn is_empty(&self) -> bool {
        self.url.is_empty() && self.state.is_empty()
    }
}

/// Director deployment bookkeeping. A non-empty `director_address` means a
/// director exists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Director {
    #[serde(default, rename = "directorName")]
    pub director_name: String,
    #[serde(default, rename = "directorAddress")]
    pub director_address: String,
    #[serde(default, rename = "directorUsername")]
    pub director_username: String,
    #[serde(default, rename = "directorPassword")]
    pub director_password: String,
    #[serde(default, rename = "directorSSLCA")]
    pub director_ssl_ca: String,
    #[serde(default)]
    pub variables: String,
    #[serde(default)]
    pub manifest: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, rename = "userOpsFile")]
    pub user_ops_file: String,
}

impl Director {
    pub fn is_empty(&self) -> bool {
        self.director_address.is_empty() && self.state.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Lb {
    #[serde(default, rename = "type")]
    pub kind: LbKind,
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub domain: String,
}

impl Lb {
    pub fn is_active(&self) -> bool {
        self.kind != LbKind::None
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// The persistent state of one environment, stored as `state.json` in the
/// state dir. One instance of this struct is threaded by value through the
/// pipeline and snapshotted to disk at every persistence boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub version: u64,
    #[serde(default, rename = "envID")]
    pub env_id: String,
    #[serde(default)]
    pub iaas: Option<Iaas>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp: Option<GcpCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureCredentials>,
    #[serde(default)]
    pub key_pair: KeyPair,
    #[serde(default)]
    pub jumpbox: Jumpbox,
    #[serde(default)]
    pub bosh: Director,
    #[serde(default)]
    pub lb: Lb,
    #[serde(default, rename = "tfState")]
    pub tf_state: String,
    #[serde(default)]
    pub no_director: bool,
    #[serde(default)]
    pub migrated_from_stack: bool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            env_id: String::new(),
            iaas: None,
            aws: None,
            gcp: None,
            azure: None,
            key_pair: KeyPair::default(),
            jumpbox: Jumpbox::default(),
            bosh: Director::default(),
            lb: Lb::default(),
            tf_state: String::new(),
            no_director: false,
            migrated_from_stack: false,
        }
    }
}

impl State {
    pub fn new(iaas: Iaas) -> Self {
        Self {
            iaas: Some(iaas),
            ..Self::default()
        }
    }

    pub fn has_infrastructure(&self) -> bool {
        !self.tf_state.is_empty()
    }

    pub fn has_jumpbox(&self) -> bool {
        !self.jumpbox.is_empty()
    }

    pub fn has_director(&self) -> bool {
        !self.bosh.is_empty()
    }

    /// Check the cross-field invariants that must hold for every state the
    /// pipeline produces. A violation here is a bug, not an operator error.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if self.no_director && self.has_director() {
            return Err(DomainError::InvariantViolation(
                "noDirector is set but a director is recorded in state".into(),
            ));
        }
        if self.has_director() && !self.has_jumpbox() {
            return Err(DomainError::InvariantViolation(
                "a director is recorded in state without a jumpbox".into(),
            ));
        }
        if self.has_jumpbox() && self.key_pair.is_empty() {
            return Err(DomainError::InvariantViolation(
                "a jumpbox is recorded in state without a keypair".into(),
            ));
        }
        if self.has_infrastructure() && self.env_id.is_empty() {
            return Err(DomainError::InvariantViolation(
                "infrastructure is recorded in state without an envID".into(),
            ));
        }
        Ok(())
    }
}
