use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use super::browse::BrowseCommand;
use super::manage::{AddCommand, FiltersCommand, RemoveCommand, SeedCommand, UpdateCommand};
use crate::config::Config;
use crate::remote::SqliteCourseStore;

/// coursepager - browse the course catalog page by page, live
#[derive(Parser)]
#[command(
    name = "coursepager",
    version,
    about = "Browse the course catalog page by page, with live updates",
    long_about = r#"coursepager shows one page of the course catalog at a time and keeps it
current as courses are added, changed or removed.

Examples:
  coursepager                          # Show the first page
  coursepager browse --page 3 --watch  # Follow page 3 as the catalog changes
  coursepager seed --count 40          # Fill an empty catalog with sample courses
  coursepager filters                  # List branches, programs and technologies"#
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    pub debug: bool,

    /// Course database file
    #[arg(long = "database", global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a page of courses
    Browse(BrowseCommand),
    /// Add a course
    Add(AddCommand),
    /// Change an existing course
    Update(UpdateCommand),
    /// Remove a course
    Remove(RemoveCommand),
    /// Insert sample courses
    Seed(SeedCommand),
    /// List the filter options
    Filters(FiltersCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        if self.debug {
            debug!("Debug logging enabled");
        }

        let mut config = Config::init().await?;
        if let Some(database) = &self.database {
            config.database_path = Some(database.clone());
        }
        config.validate()?;
        debug!("Configuration initialized");

        match self.command {
            Some(Commands::Browse(cmd)) => cmd.execute(&config).await,
            Some(Commands::Add(cmd)) => cmd.execute(&config),
            Some(Commands::Update(cmd)) => cmd.execute(&config),
            Some(Commands::Remove(cmd)) => cmd.execute(&config),
            Some(Commands::Seed(cmd)) => cmd.execute(&config),
            Some(Commands::Filters(cmd)) => cmd.execute(),
            None => BrowseCommand::default().execute(&config).await,
        }
    }
}

/// Open the configured course store
pub(crate) fn open_store(config: &Config) -> Result<SqliteCourseStore> {
    let path = config.database_path();
    info!("Using course database {}", path.display());
    let store = SqliteCourseStore::open(&path)?
        .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
        .with_journal_retention(Duration::from_secs(config.journal_retention_secs));
    store.prune_journal()?;
    Ok(store)
}
