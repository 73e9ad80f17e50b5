//! # linkmeta core
//!
//! IO-free engine for propagating link-derived metadata between notes:
//! the rule model, source/target pattern matching, rule selection and
//! validation, value generation, metadata merging (including history and
//! link-removal cleanup), and the per-document processing pass.
//!
//! This crate contains no tokio, filesystem, or other native-only
//! dependencies. Hosts plug in through the [`store::DocumentStore`] trait.
//!
//! ## Data flow
//!
//! ```text
//! source edited ──▶ outgoing links ──▶ rules::find_applicable_rules
//!                                          │
//!                                          ▼
//!                   value::generate_value ──▶ merge::merge_value ──▶ target frontmatter
//!                                                    └──▶ merge::append_history
//! ```

pub mod extract;
pub mod frontmatter;
pub mod links;
pub mod merge;
pub mod models;
pub mod pattern;
pub mod processor;
pub mod rules;
pub mod store;
pub mod value;
