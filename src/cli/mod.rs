pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::config;
use crate::database::{DatabaseManager, PgCatalog};

#[derive(Parser)]
#[command(name = "monk-org")]
#[command(about = "Monk organization administration - promote members and inspect their schemas")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(long, global = true, help = "Organization database name (defaults to the DATABASE_URL database)")]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Promote an organization member to owner")]
    Promote(commands::promote::PromoteArgs),

    #[command(about = "List triggers on tables in a schema")]
    Triggers(commands::triggers::TriggersArgs),

    #[command(about = "Print the quota trigger SQL for a table")]
    QuotaSql(commands::quota_sql::QuotaSqlArgs),

    #[command(about = "Create the organization catalog tables if missing")]
    Bootstrap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Catalog for the selected database, with the configured session timeouts
pub async fn connect(database: Option<&str>) -> anyhow::Result<PgCatalog> {
    let pool = match database {
        Some(name) => DatabaseManager::organization_pool(name).await?,
        None => DatabaseManager::main_pool().await?,
    };
    Ok(PgCatalog::new(pool).with_timeouts(&config().database))
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let database = cli.database.as_deref();

    let result = match cli.command {
        Commands::Promote(args) => commands::promote::handle(args, database, output_format).await,
        Commands::Triggers(args) => commands::triggers::handle(args, database, output_format).await,
        Commands::QuotaSql(args) => commands::quota_sql::handle(args, output_format),
        Commands::Bootstrap => commands::bootstrap::handle(database, output_format).await,
    };

    DatabaseManager::close_all().await;
    result
}
