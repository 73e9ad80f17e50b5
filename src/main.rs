//! # linkmeta CLI
//!
//! ```bash
//! linkmeta --config ./config/linkmeta.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `linkmeta init` | Write an example configuration file |
//! | `linkmeta process <path>` | Process one document now |
//! | `linkmeta process-all` | Process every document in the vault |
//! | `linkmeta validate` | Validate the rule set |
//! | `linkmeta rules list` | List configured rules |
//! | `linkmeta rules enable <id>` / `disable <id>` | Toggle a rule and save the config |
//! | `linkmeta rules show <id>` | Show the documents a rule matches |
//! | `linkmeta watch` | Watch the vault and process edits after they settle |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use linkmeta::config::{load_config, Config};
use linkmeta::progress::ProgressMode;
use linkmeta::{init, process, rules_cmd, validate, watch};

/// linkmeta: propagate dates, titles and backlinks from linking notes into
/// the frontmatter of the notes they link to.
#[derive(Parser)]
#[command(
    name = "linkmeta",
    about = "Propagate link-derived metadata between Markdown notes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/linkmeta.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example configuration to the `--config` path.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Process one document now: apply every matching rule to the
    /// documents it links to.
    Process {
        /// Document path, vault-relative or absolute.
        path: String,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Process every document in the vault, one at a time.
    ProcessAll {
        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Validate the configured rules. Exits non-zero on errors.
    Validate {
        #[arg(long)]
        json: bool,
    },

    /// Inspect and toggle rules.
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Watch the vault and process documents after edits settle.
    Watch,
}

#[derive(Subcommand)]
enum RulesAction {
    /// List rules in priority order.
    List,
    /// Enable a rule and save the configuration.
    Enable { id: String },
    /// Disable a rule and save the configuration.
    Disable { id: String },
    /// Show the vault documents a rule's source and target criteria match.
    Show { id: String },
}

fn init_tracing(enable_logging: bool) {
    let fallback = if enable_logging {
        "linkmeta=debug,linkmeta_core=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Init { force } = cli.command {
        init_tracing(false);
        init::run_init(&cli.config, force)?;
        return Ok(());
    }

    let cfg: Config = load_config(&cli.config)?;
    init_tracing(cfg.options.enable_logging);

    match cli.command {
        Commands::Process { path, json } => {
            process::run_process(&cfg, &path, json).await?;
        }
        Commands::ProcessAll { progress, json } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            process::run_process_all(&cfg, mode, json).await?;
        }
        Commands::Validate { json } => {
            validate::run_validate(&cfg, json)?;
        }
        Commands::Rules { action } => match action {
            RulesAction::List => rules_cmd::run_rules_list(&cfg)?,
            RulesAction::Enable { id } => rules_cmd::run_rules_toggle(&cli.config, cfg, &id, true)?,
            RulesAction::Disable { id } => rules_cmd::run_rules_toggle(&cli.config, cfg, &id, false)?,
            RulesAction::Show { id } => rules_cmd::run_rules_show(&cfg, &id).await?,
        },
        Commands::Watch => {
            watch::run_watch(&cli.config, cfg).await?;
        }
        Commands::Init { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
