//! `linkmeta validate`: check the configured rule set.

use anyhow::{bail, Result};
use linkmeta_core::models::{Rule, ValidationResult};
use linkmeta_core::rules::{validate_rule, validate_rule_set};
use serde::Serialize;

use crate::config::Config;

#[derive(Debug, Serialize)]
pub struct RuleReport {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub result: ValidationResult,
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub rule_set: ValidationResult,
    pub rules: Vec<RuleReport>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.rule_set.errors.len() + self.rules.iter().map(|r| r.result.errors.len()).sum::<usize>()
    }

    pub fn warning_count(&self) -> usize {
        self.rule_set.warnings.len() + self.rules.iter().map(|r| r.result.warnings.len()).sum::<usize>()
    }
}

/// Validate the set as a whole plus every rule individually.
pub fn validate_rules(rules: &[Rule]) -> ValidationReport {
    let rule_set = validate_rule_set(rules);
    let reports: Vec<RuleReport> = rules
        .iter()
        .map(|rule| RuleReport {
            id: rule.id.clone(),
            name: rule.name.clone(),
            enabled: rule.enabled,
            result: validate_rule(rule),
        })
        .collect();
    let is_valid = rule_set.is_valid && reports.iter().all(|r| r.result.is_valid);

    ValidationReport {
        is_valid,
        rule_set,
        rules: reports,
    }
}

/// Print the report; fails (non-zero exit) when any rule has errors.
pub fn run_validate(config: &Config, json: bool) -> Result<()> {
    let report = validate_rules(&config.rules);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{:<20} {:<8} {:<8} NAME", "RULE", "ENABLED", "STATUS");
        for rule in &report.rules {
            let status = if !rule.result.is_valid {
                "ERROR"
            } else if !rule.result.warnings.is_empty() {
                "WARN"
            } else {
                "OK"
            };
            println!("{:<20} {:<8} {:<8} {}", rule.id, rule.enabled, status, rule.name);
            for e in &rule.result.errors {
                println!("    error: {}", e);
            }
            for w in &rule.result.warnings {
                println!("    warning: {}", w);
            }
        }
        for e in &report.rule_set.errors {
            println!("error: {}", e);
        }
        for w in &report.rule_set.warnings {
            println!("warning: {}", w);
        }
        println!(
            "{} rules, {} errors, {} warnings",
            report.rules.len(),
            report.error_count(),
            report.warning_count()
        );
    }

    if !report.is_valid {
        bail!("Rule set is invalid ({} errors)", report.error_count());
    }
    Ok(())
}
