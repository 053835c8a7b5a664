// Configuration loader
// Loads ~/.lifeline/config.toml, then applies environment overrides

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::{lifeline_dir, Config};
use crate::crisis::{Language, LexiconStore, RegionCode, ResourceTable};
use crate::errors::{config_parse_error, table_load_error};

/// Load configuration from the lifeline config file and environment
pub fn load_config() -> Result<Config> {
    let path = lifeline_dir().join("config.toml");
    let mut config = load_config_from(&path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Load a config file; a missing file yields defaults
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!(config_parse_error(&path.display().to_string(), e)))
}

/// Apply LIFELINE_* overrides read through `var`
pub fn apply_env_overrides<F>(config: &mut Config, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(tag) = var("LIFELINE_LANGUAGE") {
        match Language::parse(&tag) {
            Ok(language) => config.default_language = language,
            Err(e) => tracing::warn!(error = %e, "Ignoring LIFELINE_LANGUAGE"),
        }
    }

    if let Some(code) = var("LIFELINE_REGION") {
        match RegionCode::parse(&code) {
            Ok(region) => config.default_region = region,
            Err(e) => tracing::warn!(error = %e, "Ignoring LIFELINE_REGION"),
        }
    }

    if let Some(path) = var("LIFELINE_AUDIT_LOG").filter(|p| !p.is_empty()) {
        config.audit_log_path = PathBuf::from(path);
    }
}

impl Config {
    /// Lexicons for this config; a broken override file falls back to builtin
    pub fn lexicons(&self) -> LexiconStore {
        let Some(path) = &self.lexicon_path else {
            return LexiconStore::builtin();
        };

        match LexiconStore::load_from_file(path) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("{}", table_load_error("lexicon", &path.display().to_string(), format!("{:#}", e)));
                LexiconStore::builtin()
            }
        }
    }

    /// Crisis resources; a broken override file falls back to builtin
    pub fn resources(&self) -> ResourceTable {
        let Some(path) = &self.resources_path else {
            return ResourceTable::builtin();
        };

        match ResourceTable::load_from_file(path) {
            Ok(table) => table,
            Err(e) => {
                tracing::error!("{}", table_load_error("resource table", &path.display().to_string(), format!("{:#}", e)));
                ResourceTable::builtin()
            }
        }
    }
}
