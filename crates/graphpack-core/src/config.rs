use crate::category::{Category, CategoryRegistry};
use crate::error::ProjectError;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV_VAR: &str = "GRAPHPACK_CONFIG";

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_pretty_json() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    #[serde(default = "default_app_version")]
    pub app_version: String,
    #[serde(default = "default_pretty_json")]
    pub pretty_json: bool,
    /// Replaces the built-in category table when present.
    #[serde(default)]
    pub categories: Option<Vec<Category>>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            app_version: default_app_version(),
            pretty_json: default_pretty_json(),
            categories: None,
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ProjectError> {
        let config: CoreConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ProjectError> {
        debug!(path = %path.display(), "loading config");
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Reads the file named by `GRAPHPACK_CONFIG`, or the defaults when it is unset.
    pub fn from_env() -> Result<Self, ProjectError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                info!(path = ?path, "config from environment");
                Self::from_path(Path::new(&path))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn registry(&self) -> Result<CategoryRegistry, ProjectError> {
        match &self.categories {
            Some(categories) => CategoryRegistry::new(categories.clone()),
            None => Ok(CategoryRegistry::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TopFolder;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert!(config.pretty_json);
        assert_eq!(config.app_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.registry().unwrap(), CategoryRegistry::default());
    }

    #[test]
    fn test_custom_categories() {
        let config = CoreConfig::from_json_str(
            r#"{
                "appVersion": "9.9.9",
                "prettyJson": false,
                "categories": [
                    { "key": "units", "topFolder": "server", "directory": "units", "label": "Units" },
                    { "key": "hud", "topFolder": "client", "directory": "hud", "label": "HUD" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.app_version, "9.9.9");
        assert!(!config.pretty_json);
        let registry = config.registry().unwrap();
        assert_eq!(registry.fallback(TopFolder::Client).key, "hud");
    }

    #[test]
    fn test_invalid_categories_rejected() {
        let config = CoreConfig::from_json_str(
            r#"{ "categories": [ { "key": "units", "topFolder": "server", "directory": "units", "label": "U" } ] }"#,
        )
        .unwrap();
        assert!(config.registry().is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graphpack.json");
        std::fs::write(&path, r#"{ "appVersion": "1.2.3" }"#).unwrap();
        assert_eq!(CoreConfig::from_path(&path).unwrap().app_version, "1.2.3");
    }
}
