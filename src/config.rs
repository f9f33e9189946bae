//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/rendr/rendr.toml`
//! 3. Local config: `<document_dir>/.rendr.toml` (next to the rendered document)
//! 4. Environment variables: `RENDR_*` prefix

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::relationship::{
    ARCROLE_ALL, ARCROLE_DIMENSION_DOMAIN, ARCROLE_DOMAIN_MEMBER, ARCROLE_HYPERCUBE_DIMENSION,
};

/// Standard label role used for concept labels.
pub const STANDARD_LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/label";

/// Relationship-graph traversal settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TraversalConfig {
    /// Cap applied when a traversal asks for unlimited generations (0 = no cap)
    pub max_generations: u32,
    /// Arcroles making up the "all dimensional arcroles" relationship kind
    pub dimension_arcroles: Vec<String>,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_generations: 0,
            dimension_arcroles: vec![
                ARCROLE_ALL.into(),
                ARCROLE_HYPERCUBE_DIMENSION.into(),
                ARCROLE_DIMENSION_DOMAIN.into(),
                ARCROLE_DOMAIN_MEMBER.into(),
            ],
        }
    }
}

/// Raw traversal config for intermediate parsing (arrays are Option to detect "not specified").
///
/// Used during layered config merging to distinguish between:
/// - `None` → field not specified, inherit from base
/// - `Some([])` → explicit empty array
/// - `Some([...])` → explicit values to merge
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawTraversalConfig {
    pub max_generations: Option<u32>,
    pub dimension_arcroles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Log expression failures at error level (they are recovered either way)
    pub log_failures: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { log_failures: true }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawEvaluationConfig {
    pub log_failures: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub lang: Option<String>,
    pub label_role: Option<String>,
    #[serde(default)]
    pub traversal: RawTraversalConfig,
    #[serde(default)]
    pub evaluation: RawEvaluationConfig,
}

impl TraversalConfig {
    /// Merge arrays with union semantics and negation support.
    ///
    /// - Items from overlay are added to base
    /// - Items prefixed with `!` remove the corresponding item from the result
    /// - Duplicates are de-duplicated
    ///
    /// # Examples
    /// ```ignore
    /// merge_array(&["a", "b"], &["c"])       // → ["a", "b", "c"]
    /// merge_array(&["a", "b"], &["!a", "c"]) // → ["b", "c"]
    /// ```
    pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
        let mut result: HashSet<String> = base.iter().cloned().collect();

        for pattern in overlay {
            if let Some(negated) = pattern.strip_prefix('!') {
                result.remove(negated);
            } else {
                result.insert(pattern.clone());
            }
        }

        // Convert to sorted Vec for deterministic output
        let mut vec: Vec<String> = result.into_iter().collect();
        vec.sort();
        vec
    }

    /// Merge overlay config onto self (base): scalars win if set, arrays union.
    pub fn merge(&self, overlay: &RawTraversalConfig) -> Self {
        Self {
            max_generations: overlay.max_generations.unwrap_or(self.max_generations),
            dimension_arcroles: overlay
                .dimension_arcroles
                .as_ref()
                .map(|o| Self::merge_array(&self.dimension_arcroles, o))
                .unwrap_or_else(|| self.dimension_arcroles.clone()),
        }
    }

    /// Apply global config onto defaults; arrays REPLACE.
    pub fn apply_global(&self, global: &RawTraversalConfig) -> Self {
        Self {
            max_generations: global.max_generations.unwrap_or(self.max_generations),
            dimension_arcroles: global
                .dimension_arcroles
                .clone()
                .unwrap_or_else(|| self.dimension_arcroles.clone()),
        }
    }
}

/// Unified configuration for rendr.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Language of labels and messages (default: "en")
    pub lang: String,
    /// Label role used for concept labels
    pub label_role: String,
    pub traversal: TraversalConfig,
    pub evaluation: EvaluationConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lang: "en".into(),
            label_role: STANDARD_LABEL_ROLE.into(),
            traversal: TraversalConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

/// Get the XDG config directory for rendr.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rendr").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("rendr.toml"))
}

/// Get the path to the local config file next to a document.
pub fn local_config_path(document_dir: &Path) -> PathBuf {
    document_dir.join(".rendr.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Merge overlay config onto self (base) with union semantics for arrays.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            lang: overlay.lang.clone().unwrap_or_else(|| self.lang.clone()),
            label_role: overlay
                .label_role
                .clone()
                .unwrap_or_else(|| self.label_role.clone()),
            traversal: self.traversal.merge(&overlay.traversal),
            evaluation: EvaluationConfig {
                log_failures: overlay
                    .evaluation
                    .log_failures
                    .unwrap_or(self.evaluation.log_failures),
            },
        }
    }

    /// Apply global config onto defaults with REPLACE semantics for arrays.
    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            lang: global.lang.clone().unwrap_or_else(|| self.lang.clone()),
            label_role: global
                .label_role
                .clone()
                .unwrap_or_else(|| self.label_role.clone()),
            traversal: self.traversal.apply_global(&global.traversal),
            evaluation: EvaluationConfig {
                log_failures: global
                    .evaluation
                    .log_failures
                    .unwrap_or(self.evaluation.log_failures),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Precedence (lowest to highest)
    /// 1. Compiled defaults
    /// 2. Global config: `$XDG_CONFIG_HOME/rendr/rendr.toml` (arrays REPLACE defaults)
    /// 3. Local config: `<document_dir>/.rendr.toml` (arrays UNION with global)
    /// 4. Environment variables: `RENDR_*` prefix (REPLACES - explicit override)
    pub fn load(document_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.apply_global(&raw);
            }
        }

        if let Some(dir) = document_dir {
            current = current.with_local(dir)?;
        }

        Self::apply_env_overrides(current)
    }

    /// Merge the local config of `document_dir`, if present.
    pub fn with_local(self, document_dir: &Path) -> Result<Self, ApplicationError> {
        let local_path = local_config_path(document_dir);
        if !local_path.exists() {
            return Ok(self);
        }
        let raw = load_raw_settings(&local_path)?;
        Ok(self.merge_with(&raw))
    }

    /// Apply RENDR_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("RENDR")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("traversal.dimension_arcroles")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("lang") {
            settings.lang = val;
        }
        if let Ok(val) = config.get_string("label_role") {
            settings.label_role = val;
        }
        if let Ok(val) = config.get::<u32>("traversal.max_generations") {
            settings.traversal.max_generations = val;
        }
        if let Ok(val) = config.get::<Vec<String>>("traversal.dimension_arcroles") {
            settings.traversal.dimension_arcroles = val;
        }
        if let Ok(val) = config.get_bool("evaluation.log_failures") {
            settings.evaluation.log_failures = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# rendr configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/rendr/rendr.toml   (defines your baseline)
#   Local:  <document_dir>/.rendr.toml   (document-specific additions)
#   Env:    RENDR_* environment variables (explicit overrides, e.g. RENDR_TRAVERSAL__MAX_GENERATIONS=3)
#
# Array Merge Semantics:
#   Global config REPLACES compiled defaults.
#   Local config UNIONS with global.
#   Use "!item" in local config to REMOVE an inherited item.

# Language of labels and messages
# lang = "en"

# Label role for concept labels
# label_role = "http://www.xbrl.org/2003/role/label"

[traversal]
# Cap for unlimited descendant/ancestor traversals (0 = no cap)
# max_generations = 0

# Arcroles treated as "all dimensional arcroles"
# dimension_arcroles = ["http://xbrl.org/int/dim/arcrole/dimension-domain", "http://xbrl.org/int/dim/arcrole/domain-member"]

[evaluation]
# Log recovered expression failures
# log_failures = true
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
