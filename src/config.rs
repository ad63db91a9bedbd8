//! Engine configuration (`strata.toml`).
//!
//! ```toml
//! [merge]
//! workers = 4                  # 0 = available parallelism
//! on_table_failure = "abort"   # or "continue"
//!
//! [diff]
//! format = "current"           # or "legacy"
//! ```
//!
//! Every field is optional. A missing file is not an error.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use strata_value::Format;

use crate::merge::types::{FailurePolicy, MergeOptions};

// ---------------------------------------------------------------------------
// StrataConfig
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    #[serde(default)]
    pub merge: MergeSection,

    #[serde(default)]
    pub diff: DiffSection,
}

/// `[merge]`: how [`merge_commits`](crate::merge::merge_commits) runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeSection {
    /// Worker threads for per-table merges (default `0`: one per core).
    #[serde(default)]
    pub workers: usize,

    /// What happens when a table cannot be merged (default `abort`).
    #[serde(default)]
    pub on_table_failure: FailurePolicy,
}

/// `[diff]`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiffSection {
    /// Value format for stores created by embedders (default `current`).
    #[serde(default)]
    pub format: Format,
}

impl StrataConfig {
    /// The merge options this configuration describes.
    #[must_use]
    pub const fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            workers: self.merge.workers,
            on_table_failure: self.merge.on_table_failure,
        }
    }

    #[must_use]
    pub const fn format(&self) -> Format {
        self.diff.format
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The file being loaded, if any.
    pub path: Option<PathBuf>,
    /// Message, prefixed with the line number when known.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(p) => write!(f, "{}: {}", p.display(), self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl StrataConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` on read errors other than not-found, invalid
    /// TOML, or unknown fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start].matches('\n').count() + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}
