//! Core data models used throughout linkmeta.
//!
//! These types describe the user-declared rules, the global processing
//! options, and the snapshots and reports that flow through a processing
//! pass.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The structured metadata block of a document, in document key order.
pub type Frontmatter = Map<String, Value>;

/// Policy governing what value a rule generates and how it merges with an
/// existing field value.
///
/// Serialized as the snake_case strings used in configuration files. Any
/// string that is not a known type round-trips as [`ValueType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueType {
    Date,
    DateAndTitle,
    AppendLink,
    AppendUniqueLink,
    ReplaceLink,
    /// Reserved. Has no generation or merge behavior and is rejected by
    /// validation.
    Custom,
    /// No type given in configuration.
    #[default]
    Missing,
    /// Unrecognized type string, kept verbatim.
    Other(String),
}

impl ValueType {
    pub fn as_str(&self) -> &str {
        match self {
            ValueType::Date => "date",
            ValueType::DateAndTitle => "date_and_title",
            ValueType::AppendLink => "append_link",
            ValueType::AppendUniqueLink => "append_unique_link",
            ValueType::ReplaceLink => "replace_link",
            ValueType::Custom => "custom",
            ValueType::Missing => "",
            ValueType::Other(s) => s,
        }
    }

    /// Date-bearing types merge by recency.
    pub fn is_date(&self) -> bool {
        matches!(self, ValueType::Date | ValueType::DateAndTitle)
    }

    /// Link-bearing types write a link reference to the source document.
    pub fn is_link(&self) -> bool {
        matches!(
            self,
            ValueType::AppendLink | ValueType::AppendUniqueLink | ValueType::ReplaceLink
        )
    }
}

impl From<String> for ValueType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "date" => ValueType::Date,
            "date_and_title" => ValueType::DateAndTitle,
            "append_link" => ValueType::AppendLink,
            "append_unique_link" => ValueType::AppendUniqueLink,
            "replace_link" => ValueType::ReplaceLink,
            "custom" => ValueType::Custom,
            "" => ValueType::Missing,
            _ => ValueType::Other(s),
        }
    }
}

impl From<ValueType> for String {
    fn from(v: ValueType) -> Self {
        v.as_str().to_string()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declarative mapping from a source pattern and target criterion to a
/// metadata field update policy.
///
/// Missing string fields deserialize as empty so that validation can report
/// them rather than the configuration loader rejecting the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_folder: Option<String>,
    #[serde(default)]
    pub update_field: String,
    #[serde(default)]
    pub value_type: ValueType,
    /// Lower values are applied first. Signed so that a negative value can
    /// be reported by validation instead of failing deserialization.
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides [`ProcessingOptions::preserve_history`] when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_history: Option<bool>,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    /// The target tag, treating an empty string as unset.
    pub fn target_tag(&self) -> Option<&str> {
        self.target_tag.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// The target folder, treating an empty string as unset.
    pub fn target_folder(&self) -> Option<&str> {
        self.target_folder.as_deref().filter(|f| !f.trim().is_empty())
    }

    /// Whether history is recorded for this rule under the given options.
    pub fn history_enabled(&self, options: &ProcessingOptions) -> bool {
        self.preserve_history.unwrap_or(options.preserve_history)
    }

    /// A short label for log lines: the name when present, else the id.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Global options shared by every rule in a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    #[serde(default)]
    pub preserve_history: bool,
    #[serde(default)]
    pub update_on_delete: bool,
    /// chrono format used to recognize dates in file names.
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub enable_logging: bool,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_debounce_ms() -> u64 {
    2000
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            preserve_history: false,
            update_on_delete: false,
            date_format: default_date_format(),
            debounce_ms: default_debounce_ms(),
            enable_logging: false,
        }
    }
}

/// Rules plus options, passed explicitly into every pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    pub options: ProcessingOptions,
}

/// Everything value generation needs for one rule application.
#[derive(Debug, Clone)]
pub struct ProcessingContext<'a> {
    pub source_path: &'a str,
    pub target_path: &'a str,
    pub extracted_date: Option<&'a str>,
    pub extracted_title: Option<&'a str>,
    pub rule: &'a Rule,
}

/// Outcome of validating a rule or a rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn from_messages(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// A heading line from a document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
}

/// Read-only view of a document's metadata, as the host indexes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataSnapshot {
    pub frontmatter: Frontmatter,
    /// Inline tag annotations from the body, `#`-prefixed.
    pub tags: Vec<String>,
    pub headings: Vec<Heading>,
    /// Raw outgoing link targets, in document order, unresolved.
    pub links: Vec<String>,
    pub created: Option<DateTime<Utc>>,
}

/// Counters for one processing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub documents: usize,
    pub links: usize,
    pub rule_applications: usize,
    pub fields_updated: usize,
    pub history_entries: usize,
    pub errors: usize,
    /// Target documents whose metadata block was rewritten.
    #[serde(skip)]
    pub updated_targets: Vec<String>,
}

impl ProcessReport {
    pub fn absorb(&mut self, other: ProcessReport) {
        self.documents += other.documents;
        self.links += other.links;
        self.rule_applications += other.rule_applications;
        self.fields_updated += other.fields_updated;
        self.history_entries += other.history_entries;
        self.errors += other.errors;
        for target in other.updated_targets {
            if !self.updated_targets.contains(&target) {
                self.updated_targets.push(target);
            }
        }
    }
}
