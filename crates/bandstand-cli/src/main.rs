use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use bandstand_core::model::UserId;
use bandstand_ingest::{Config, IngestError};

mod commands;
mod output;

use commands::{BandAction, ConfigAction, Context, DocAction, TuneAction, UserAction};

#[derive(Debug, Parser)]
#[command(name = "bandstand", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the database (default: ~/.local/share/bandstand/bandstand.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Act as this user id
    #[arg(long = "as", value_name = "USER_ID", global = true)]
    as_user: Option<i64>,

    /// Log level: trace, debug, info, warn, or error (default from config)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    Init,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Register and look up users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Create bands and manage their members
    ///
    /// Every band has exactly one owner. The owner is a member from the
    /// moment the band exists and can never be removed from it.
    Band {
        #[command(subcommand)]
        action: BandAction,
    },
    /// Add, edit, and list tunes
    ///
    /// Edits are checked against the tune's version. If someone else saved
    /// the tune since you read it, the edit is refused with an edit
    /// conflict; pass --retry to re-apply it to the newer version instead.
    Tune {
        #[command(subcommand)]
        action: TuneAction,
    },
    /// Upload and manage documents attached to tunes
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },
    /// Remove stale staged uploads now
    Sweep,
}

fn init_logging(cli_level: Option<&str>, config: &Config) -> Result<()> {
    let level = match cli_level.unwrap_or(&config.logging.level) {
        "trace" => twyg::LogLevel::Trace,
        "debug" => twyg::LogLevel::Debug,
        "warn" => twyg::LogLevel::Warn,
        "error" => twyg::LogLevel::Error,
        _ => twyg::LogLevel::Info,
    };

    let opts = twyg::OptsBuilder::new()
        .coloured(config.logging.coloured)
        .level(level)
        .report_caller(false)
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid logging options: {e:?}"))?;
    twyg::setup(opts).map_err(|e| anyhow::anyhow!("Could not set up logging: {e:?}"))?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = match cli.db {
        Some(db_path) => Config::load_with_db_path(db_path)?,
        None => Config::load()?,
    };
    init_logging(cli.log_level.as_deref(), &config)?;

    let ctx = Context::new(config, cli.as_user.map(UserId::new));

    match cli.command {
        Commands::Init => commands::init(&ctx),
        Commands::Config { action } => commands::config::run(&ctx, action),
        Commands::User { action } => commands::user::run(&ctx, action),
        Commands::Band { action } => commands::band::run(&ctx, action),
        Commands::Tune { action } => commands::tune::run(&ctx, action),
        Commands::Doc { action } => commands::doc::run(&ctx, action),
        Commands::Sweep => commands::sweep(&ctx),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(err) = e.downcast_ref::<bandstand_core::Error>() {
                output::print_error(&err.report());
            } else if let Some(err) = e.downcast_ref::<IngestError>() {
                output::print_error(&err.report());
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
