use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `RULEKIT__STORE__PATH=rules.json`.
pub const ENV_PREFIX: &str = "RULEKIT";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

impl EngineConfig {
    /// Load from an optional YAML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// JSON file holding the rules; `None` keeps them in memory.
    #[serde(default = "default_store_path")]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> Option<PathBuf> {
    Some(PathBuf::from("rules.json"))
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_audit_path(),
        }
    }
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("evaluations.jsonl")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RulesConfig {
    /// Lowercase whole expressions (quoted literals included) before storing.
    #[serde(default = "default_true")]
    pub lowercase_expressions: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            lowercase_expressions: true,
        }
    }
}

fn default_true() -> bool {
    true
}
