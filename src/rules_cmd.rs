//! `linkmeta rules ...`: list, toggle, and inspect rules.

use anyhow::{anyhow, Result};
use linkmeta_core::rules::{files_in_folder, files_matching_source, files_with_tag};
use std::path::Path;

use crate::config::{save_config, Config};
use crate::vault::VaultStore;

pub fn run_rules_list(config: &Config) -> Result<()> {
    if config.rules.is_empty() {
        println!("No rules configured.");
        return Ok(());
    }

    println!(
        "{:<20} {:<8} {:<9} {:<20} {:<20} {:<18} FIELD",
        "RULE", "ENABLED", "PRIORITY", "SOURCE", "TARGET", "TYPE"
    );
    let mut rules: Vec<_> = config.rules.iter().collect();
    rules.sort_by_key(|r| r.priority);
    for rule in rules {
        let target = match (rule.target_tag(), rule.target_folder()) {
            (Some(tag), _) => tag.to_string(),
            (None, Some(folder)) => format!("{}/", folder.trim_end_matches('/')),
            (None, None) => "*".to_string(),
        };
        println!(
            "{:<20} {:<8} {:<9} {:<20} {:<20} {:<18} {}",
            rule.id,
            rule.enabled,
            rule.priority,
            rule.source_pattern,
            target,
            rule.value_type,
            rule.update_field
        );
    }
    Ok(())
}

/// Enable or disable a rule and save the configuration.
pub fn run_rules_toggle(config_path: &Path, mut config: Config, id: &str, enabled: bool) -> Result<()> {
    let rule = config
        .find_rule_mut(id)
        .ok_or_else(|| anyhow!("No rule with id '{}'", id))?;

    if rule.enabled == enabled {
        println!("Rule '{}' is already {}.", id, state(enabled));
        return Ok(());
    }
    rule.enabled = enabled;
    save_config(config_path, &config)?;
    println!("Rule '{}' {}.", id, state(enabled));
    Ok(())
}

fn state(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

/// Show which vault documents a rule's source and target criteria match.
pub async fn run_rules_show(config: &Config, id: &str) -> Result<()> {
    let rule = config
        .rules
        .iter()
        .find(|r| r.id == id)
        .ok_or_else(|| anyhow!("No rule with id '{}'", id))?;
    let store = VaultStore::open(&config.vault)?;

    let sources = files_matching_source(&store, &rule.source_pattern).await?;
    let targets = match (rule.target_tag(), rule.target_folder()) {
        (Some(tag), _) => Some(files_with_tag(&store, tag).await?),
        (None, Some(folder)) => Some(files_in_folder(&store, folder).await?),
        (None, None) => None,
    };

    println!("{} ({})", rule.label(), rule.id);
    println!("  {} -> '{}' from {}", rule.value_type, rule.update_field, rule.source_pattern);
    println!("  source documents: {}", sources.len());
    for path in &sources {
        println!("    {}", path);
    }
    match targets {
        Some(targets) => {
            println!("  target documents: {}", targets.len());
            for path in &targets {
                println!("    {}", path);
            }
        }
        None => println!("  target documents: any linked document"),
    }
    Ok(())
}
