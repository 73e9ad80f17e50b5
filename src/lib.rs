//! # linkmeta
//!
//! Propagates metadata along links between Markdown notes. When a note
//! (the source) links to another (the target), user-declared rules decide
//! which frontmatter field of the target is updated and how: the most
//! recent date wins, links are appended (optionally uniquely), or the link
//! replaces the field. Past values can be kept in a history field.
//!
//! The engine itself lives in [`linkmeta_core`]; this crate is the native
//! host around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   events   ┌───────────┐  debounced  ┌─────────────────┐
//! │  watch   │──────────▶│ scheduler │────────────▶│ linkmeta_core   │
//! │ (polling)│            │ (tokio)   │             │ process_file    │
//! └──────────┘            └───────────┘             └───────┬─────────┘
//!                                                           │ read-modify-write
//!                                                           ▼
//!                                                     ┌──────────┐
//!                                                     │  vault   │
//!                                                     │ (files)  │
//!                                                     └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration load/save |
//! | [`vault`] | Filesystem document store |
//! | [`scheduler`] | Per-document debounce and link-removal cleanup |
//! | [`watch`] | Polling watcher feeding the scheduler |
//! | [`process`] | `process` / `process-all` commands |
//! | [`validate`] | `validate` command |
//! | [`rules_cmd`] | `rules` subcommands |
//! | [`init`] | `init` command |
//! | [`progress`] | Progress reporting on stderr |

pub mod config;
pub mod init;
pub mod process;
pub mod progress;
pub mod rules_cmd;
pub mod scheduler;
pub mod validate;
pub mod vault;
pub mod watch;

pub use linkmeta_core;
