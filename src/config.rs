//! TOML configuration.
//!
//! ```toml
//! [vault]
//! root = "./vault"
//!
//! [options]
//! preserve_history = true
//! debounce_ms = 2000
//!
//! [[rules]]
//! id = "watched"
//! name = "Last watched"
//! source_pattern = "Daily Notes/*"
//! target_tag = "#movie"
//! update_field = "lastWatched"
//! value_type = "date"
//! priority = 1
//! ```
//!
//! Rules are loaded as-is; rule-level problems are reported by
//! `linkmeta validate`, not by the loader.

use anyhow::{bail, Context, Result};
use chrono::format::{Item, StrftimeItems};
use linkmeta_core::models::{ProcessingOptions, Rule, RuleSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub vault: VaultConfig,
    #[serde(default)]
    pub options: ProcessingOptions,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VaultConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Config {
    /// Snapshot of rules and options for a processing pass.
    pub fn rule_set(&self) -> RuleSet {
        RuleSet {
            rules: self.rules.clone(),
            options: self.options.clone(),
        }
    }

    pub fn find_rule_mut(&mut self, id: &str) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|r| r.id == id)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.vault.root.as_os_str().is_empty() {
        bail!("vault.root must not be empty");
    }

    if config.options.date_format.trim().is_empty() {
        bail!("options.date_format must not be empty");
    }
    if StrftimeItems::new(&config.options.date_format).any(|item| matches!(item, Item::Error)) {
        bail!(
            "options.date_format is not a valid date format: '{}'",
            config.options.date_format
        );
    }

    if config.watch.poll_interval_ms == 0 {
        bail!("watch.poll_interval_ms must be > 0");
    }

    Ok(config)
}

/// Write the whole configuration back, replacing the file.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}
