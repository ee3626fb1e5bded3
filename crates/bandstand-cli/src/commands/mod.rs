pub mod band;
pub mod config;
pub mod doc;
pub mod tune;
pub mod user;

pub use band::BandAction;
pub use config::ConfigAction;
pub use doc::DocAction;
pub use tune::TuneAction;
pub use user::UserAction;

use anyhow::{Context as _, Result};
use bandstand_core::model::UserId;
use bandstand_core::{Database, Retry};
use bandstand_ingest::{open_database, Config, IngestionPipeline};

use crate::output::print_json;

/// What every command gets: the effective configuration and the acting user.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    caller: Option<UserId>,
}

impl Context {
    pub fn new(config: Config, caller: Option<UserId>) -> Self {
        Self { config, caller }
    }

    pub fn db(&self) -> Result<Database> {
        Ok(open_database(&self.config)?)
    }

    pub fn pipeline(&self) -> Result<IngestionPipeline> {
        Ok(IngestionPipeline::from_config(&self.config)?)
    }

    /// The acting user. Commands that act on someone's behalf require it.
    pub fn caller(&self) -> Result<UserId> {
        self.caller
            .context("This command needs to know who is acting; pass --as USER_ID")
    }
}

/// `--retry 0` surfaces edit conflicts; anything higher re-applies the edit.
fn retry_policy(retries: u32) -> Retry {
    if retries == 0 {
        Retry::Never
    } else {
        Retry::UpTo(retries)
    }
}

/// Create the database, apply migrations, and prepare the document
/// directories.
pub fn init(ctx: &Context) -> Result<()> {
    ctx.db()?;
    let pipeline = ctx.pipeline()?;
    log::info!(
        "Initialized {} (documents in {})",
        ctx.config.database_path.display(),
        pipeline.staging().documents_dir().display()
    );
    println!(
        "✓ Database ready: {}",
        ctx.config.database_path.display()
    );
    Ok(())
}

pub fn sweep(ctx: &Context) -> Result<()> {
    let removed = ctx.pipeline()?.sweep_staging()?;
    print_json(&serde_json::json!({ "removed": removed }))
}
