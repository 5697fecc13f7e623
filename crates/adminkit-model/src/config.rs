//! Framework configuration.
//!
//! Loaded from TOML by the embedding application and used to seed params,
//! reference and validator options. Every section has defaults, so an empty
//! file (or no file) is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::query::SortPayload;

// =============================================================================
// ROOT CONFIG
// =============================================================================

/// adminkit configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Defaults for list params controllers.
    pub lists: ListDefaults,
    /// Defaults for reference inputs.
    pub references: ReferenceDefaults,
    /// By-id lookup batching.
    pub batching: BatchSettings,
    /// Validator settings.
    pub validation: ValidationSettings,
}

impl AdminConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)?;
                tracing::info!(path = %path.display(), "Loaded adminkit config");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Save the config to a file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// =============================================================================
// SECTIONS
// =============================================================================

/// Defaults for list params controllers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListDefaults {
    /// Records per page.
    pub per_page: u32,
    /// Debounce for filter changes, in milliseconds.
    pub debounce_ms: u64,
    /// Initial sort.
    pub sort: SortPayload,
}

impl Default for ListDefaults {
    fn default() -> Self {
        Self {
            per_page: 10,
            debounce_ms: 500,
            sort: SortPayload::default(),
        }
    }
}

/// Defaults for reference inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceDefaults {
    /// Candidate records per page.
    pub per_page: u32,
    /// Debounce for search-as-you-type, in milliseconds.
    pub debounce_ms: u64,
    /// Initial candidate sort.
    pub sort: SortPayload,
}

impl Default for ReferenceDefaults {
    fn default() -> Self {
        Self {
            per_page: 25,
            debounce_ms: 250,
            sort: SortPayload::desc("id"),
        }
    }
}

/// By-id lookup batching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Delay before a batch is flushed, in milliseconds. 0 flushes on the next tick.
    pub delay_ms: u64,
}

/// Validator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Debounce for backend uniqueness checks, in milliseconds.
    pub unique_debounce_ms: u64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            unique_debounce_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortOrder;

    #[test]
    fn empty_toml_is_default() {
        let config = AdminConfig::from_toml_str("").expect("parse empty config");
        assert_eq!(config, AdminConfig::default());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = AdminConfig::from_toml_str(
            r#"
[references]
per_page = 50

[references.sort]
field = "name"
order = "ASC"
"#,
        )
        .expect("parse config");
        assert_eq!(config.references.per_page, 50);
        assert_eq!(config.references.debounce_ms, 250);
        assert_eq!(config.references.sort.field, "name");
        assert_eq!(config.references.sort.order, SortOrder::Asc);
        assert_eq!(config.lists, ListDefaults::default());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(matches!(
            AdminConfig::from_toml_str("lists = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
