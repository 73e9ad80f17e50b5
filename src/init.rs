//! `linkmeta init`: write an example configuration.

use anyhow::{bail, Context, Result};
use std::path::Path;

pub const EXAMPLE_CONFIG: &str = include_str!("../config/linkmeta.example.toml");

/// Write the example config to `path`. Refuses to overwrite unless `force`.
pub fn run_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    println!("Wrote example configuration to {}", path.display());
    println!("Edit vault.root, then run `linkmeta validate`.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::validate::validate_rules;

    #[test]
    fn example_config_parses_and_validates() {
        let cfg = parse_config(EXAMPLE_CONFIG).unwrap();
        assert_eq!(cfg.rules.len(), 3);
        assert!(validate_rules(&cfg.rules).is_valid);
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkmeta.toml");
        run_init(&path, false).unwrap();
        assert!(run_init(&path, false).is_err());
        run_init(&path, true).unwrap();
    }
}
