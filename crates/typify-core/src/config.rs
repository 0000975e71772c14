//! Project-level configuration.
//!
//! Every field has a default matching the conventions of a stock Django /
//! factory_boy / DRF project, so running without a config file is the normal
//! case. A JSON file can override any subset of fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{TypifyError, TypifyResult};

/// File looked up at the project root when no explicit config is given.
pub const DEFAULT_CONFIG_FILE: &str = ".django-typify.json";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "DJANGO_TYPIFY_CONFIG";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypifyConfig {
    /// Module aliases relation fields are accessed through (`models.ForeignKey`).
    pub field_namespaces: Vec<String>,
    /// Generic type used for reverse accessors.
    pub manager_type: String,
    /// Attribute that marks the manager in a queryset expression.
    pub manager_accessor: String,
    /// Substring identifying a factory class.
    pub factory_marker: String,
    /// Base class written into rewritten factory headers.
    pub factory_base: String,
    /// Generic metaclass written into rewritten factory headers.
    pub metaclass_name: String,
    /// Import line prepended when a factory header is rewritten.
    pub metaclass_import: String,
    /// First line of generated stub files.
    pub stub_header: String,
    /// Glob patterns of paths to skip during discovery.
    pub exclude: Vec<String>,
}

impl Default for TypifyConfig {
    fn default() -> Self {
        TypifyConfig {
            field_namespaces: vec!["models".to_string()],
            manager_type: "models.Manager".to_string(),
            manager_accessor: "objects".to_string(),
            factory_marker: "DjangoModelFactory".to_string(),
            factory_base: "factory.django.DjangoModelFactory".to_string(),
            metaclass_name: "BaseMetaFactory".to_string(),
            metaclass_import: "from waldur_core.core.tests.types import BaseMetaFactory"
                .to_string(),
            stub_header: "from django.db import models".to_string(),
            exclude: Vec::new(),
        }
    }
}

impl TypifyConfig {
    /// Read a config file. Fields absent from the file keep their defaults.
    pub fn from_file(path: &Path) -> TypifyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TypifyError::io(path, e))?;
        let config: TypifyConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config for a project rooted at `root`.
    ///
    /// Precedence: `explicit` path, then `$DJANGO_TYPIFY_CONFIG`, then
    /// `<root>/.django-typify.json`, then built-in defaults.
    pub fn load(root: &Path, explicit: Option<&Path>) -> TypifyResult<Self> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "loading explicit config");
            return Self::from_file(path);
        }
        if let Some(path) = env_config_path() {
            debug!(path = %path.display(), "loading config from {CONFIG_ENV_VAR}");
            return Self::from_file(&path);
        }
        let default_path = root.join(DEFAULT_CONFIG_FILE);
        if default_path.is_file() {
            debug!(path = %default_path.display(), "loading project config");
            return Self::from_file(&default_path);
        }
        Ok(Self::default())
    }

    fn validate(&self) -> TypifyResult<()> {
        if self.field_namespaces.iter().all(|ns| ns.trim().is_empty()) {
            return Err(TypifyError::Config(
                "field_namespaces must name at least one module alias".to_string(),
            ));
        }
        for (field, value) in [
            ("manager_type", &self.manager_type),
            ("manager_accessor", &self.manager_accessor),
            ("factory_marker", &self.factory_marker),
            ("factory_base", &self.factory_base),
            ("metaclass_name", &self.metaclass_name),
        ] {
            if value.trim().is_empty() {
                return Err(TypifyError::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

fn env_config_path() -> Option<PathBuf> {
    let raw = std::env::var(CONFIG_ENV_VAR).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}
