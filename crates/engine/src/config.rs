//! Mapping-layer configuration via `verso.toml`
//!
//! A single flat file. Missing keys take their defaults, so an empty file
//! is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use verso_core::schema::HISTORY_SUFFIX;
use verso_core::{VersoError, VersoResult};

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "verso.toml";

/// Mapping-layer configuration loaded from `verso.toml`.
///
/// # Example
///
/// ```toml
/// index_prefix = "staging_"
/// page_size = 100
/// proposal_grace_ms = 30000
/// load_versions = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersoConfig {
    /// Prefix prepended to every collection name (per environment or tenant).
    #[serde(default)]
    pub index_prefix: String,
    /// Page size for full scans (`all`, `find_by`, history queries).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Age after which an unconfirmed proposal may be reconciled.
    #[serde(default = "default_proposal_grace_ms")]
    pub proposal_grace_ms: u64,
    /// Load store versions on read. Entities read without their version
    /// cannot be saved under a versioned model, so turning this off only
    /// suits read-only use.
    #[serde(default = "default_load_versions")]
    pub load_versions: bool,
}

fn default_page_size() -> usize {
    100
}

fn default_proposal_grace_ms() -> u64 {
    30_000
}

fn default_load_versions() -> bool {
    true
}

impl Default for VersoConfig {
    fn default() -> Self {
        Self {
            index_prefix: String::new(),
            page_size: default_page_size(),
            proposal_grace_ms: default_proposal_grace_ms(),
            load_versions: default_load_versions(),
        }
    }
}

impl VersoConfig {
    /// Config with the given collection prefix and all other defaults.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            index_prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Grace period as a `Duration`.
    pub fn proposal_grace(&self) -> Duration {
        Duration::from_millis(self.proposal_grace_ms)
    }

    /// Live collection name for `doc_type`.
    pub fn index_name(&self, doc_type: &str) -> String {
        format!("{}{}", self.index_prefix, doc_type)
    }

    /// History collection name for `doc_type`.
    pub fn history_index_name(&self, doc_type: &str) -> String {
        format!("{}{}{}", self.index_prefix, doc_type, HISTORY_SUFFIX)
    }

    /// Reject settings no store call could honor.
    ///
    /// # Errors
    ///
    /// Returns an error if `page_size` is zero.
    pub fn validate(&self) -> VersoResult<()> {
        if self.page_size == 0 {
            return Err(VersoError::config(
                "page_size must be at least 1 in verso.toml",
            ));
        }
        Ok(())
    }

    /// Commented TOML written for a fresh install; parses to `Default`.
    pub fn default_toml() -> &'static str {
        r#"# Verso configuration
#
# Prefix prepended to every collection name, e.g. "staging_" (default: none)
index_prefix = ""

# Page size for full scans and history queries (default: 100)
page_size = 100

# Proposals older than this are eligible for reconciliation (default: 30000)
proposal_grace_ms = 30000

# Load store versions on read; required for saving versioned models (default: true)
load_versions = true
"#
    }

    /// Load and validate a config file
    ///
    /// Missing keys take their defaults. An unreadable file, bad TOML or an
    /// invalid value is a `VersoError::Config`.
    pub fn from_file(path: &Path) -> VersoResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| file_error("read", path, e))?;
        let config: VersoConfig = toml::from_str(&content).map_err(|e| file_error("parse", path, e))?;
        config.validate()?;
        debug!(target: "verso::config", path = %path.display(), prefix = %config.index_prefix, "loaded config");
        Ok(config)
    }

    /// Seed `path` with [`default_toml`](Self::default_toml) unless a file
    /// is already there. An existing file is never touched.
    pub fn write_default_if_missing(path: &Path) -> VersoResult<()> {
        if path.exists() {
            return Ok(());
        }
        std::fs::write(path, Self::default_toml()).map_err(|e| file_error("create", path, e))
    }

    /// Persist these settings, replacing whatever `path` held
    pub fn write_to_file(&self, path: &Path) -> VersoResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VersoError::config(format!("config not representable as TOML: {e}")))?;
        std::fs::write(path, content).map_err(|e| file_error("write", path, e))
    }
}

fn file_error(action: &str, path: &Path, cause: impl std::fmt::Display) -> VersoError {
    VersoError::config(format!("cannot {action} {}: {cause}", path.display()))
}
