//! Capability domain model and declarative definition schema

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

lazy_static! {
    /// Lowercase-kebab capability identifiers: `invoicing`, `tax-reports`.
    static ref CAP_KEY_RE: Regex = Regex::new(r"^[a-z][a-z0-9-]*$").unwrap();
    /// Plain `major.minor.patch` versions.
    static ref VERSION_RE: Regex = Regex::new(r"^\d+\.\d+\.\d+$").unwrap();
}

/// Where a capability row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityOrigin {
    /// Declared by a configuration unit and created by the sync step
    #[default]
    Config,
    /// Created by an operator through the administrative surface
    Operator,
}

impl std::str::FromStr for CapabilityOrigin {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "config" => Ok(CapabilityOrigin::Config),
            "operator" => Ok(CapabilityOrigin::Operator),
            _ => Err(format!("Unknown capability origin: {}", s)),
        }
    }
}

impl std::fmt::Display for CapabilityOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityOrigin::Config => write!(f, "config"),
            CapabilityOrigin::Operator => write!(f, "operator"),
        }
    }
}

impl sqlx::Type<sqlx::MySql> for CapabilityOrigin {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for CapabilityOrigin {
    fn decode(
        value: sqlx::mysql::MySqlValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for CapabilityOrigin {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        let s = self.to_string();
        <String as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&s, buf)
    }
}

/// Persisted capability row. The store, not the configuration directory, is
/// the runtime source of truth; sync only pumps definitions into it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Capability {
    pub id: Uuid,
    /// Unique lowercase-kebab identifier, immutable once created
    pub cap_key: String,
    pub name: String,
    pub version: String,
    pub is_active: bool,
    /// Declared action vocabulary, non-empty
    #[sqlx(json)]
    pub actions: Vec<String>,
    /// Actions granted by default when a member is first added, if declared
    #[sqlx(json(nullable))]
    pub default_actions: Option<Vec<String>>,
    pub origin: CapabilityOrigin,
    pub icon: Option<String>,
    pub category: Option<String>,
    #[sqlx(json(nullable))]
    pub config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Capability {
    /// Whether `action` is part of the declared vocabulary.
    pub fn declares_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }
}

/// One declarative configuration unit, as discovered from the modules
/// directory. Schema mirrors the external contract: unknown fields are
/// rejected so a typoed key fails validation instead of silently vanishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityDefinition {
    pub identifier: String,
    pub name: String,
    pub version: String,
    #[serde(default = "default_true", rename = "isActive")]
    pub is_active: bool,
    pub actions: Vec<String>,
    #[serde(default, rename = "defaultActions")]
    pub default_actions: Option<Vec<String>>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl CapabilityDefinition {
    /// Validate a discovered unit. Violations are discovery-local: the unit
    /// is skipped and the rest of discovery continues.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !CAP_KEY_RE.is_match(&self.identifier) {
            return Err(format!(
                "identifier '{}' must match ^[a-z][a-z0-9-]*$",
                self.identifier
            ));
        }
        if !VERSION_RE.is_match(&self.version) {
            return Err(format!(
                "version '{}' must be major.minor.patch",
                self.version
            ));
        }
        if self.actions.is_empty() {
            return Err("action vocabulary must not be empty".to_string());
        }
        if let Some(defaults) = &self.default_actions {
            if let Some(unknown) = defaults.iter().find(|a| !self.actions.contains(a)) {
                return Err(format!(
                    "default action '{}' is not in the declared action vocabulary",
                    unknown
                ));
            }
        }
        Ok(())
    }
}
