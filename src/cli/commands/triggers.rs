use clap::Args;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::{connect, OutputFormat};
use crate::config::config;
use crate::database::catalog::{Catalog, CatalogTx};
use crate::services::trigger_inventory::TriggerInventory;

#[derive(Args)]
pub struct TriggersArgs {
    #[arg(long, help = "Schema to inspect (defaults to the shared schema)")]
    pub namespace: Option<String>,

    #[arg(long = "table", help = "Table name, repeatable")]
    pub tables: Vec<String>,

    #[arg(long, help = "Inspect every table owned by this database role")]
    pub owner: Option<String>,
}

pub async fn handle(args: TriggersArgs, database: Option<&str>, output_format: OutputFormat) -> anyhow::Result<()> {
    let namespace = args
        .namespace
        .unwrap_or_else(|| config().promotion.shared_namespace.clone());
    let catalog = connect(database).await?;

    let mut tx = catalog.begin().await?;
    let mut tables = args.tables;
    if let Some(owner) = &args.owner {
        for table in tx.owned_tables(&namespace, owner).await? {
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
    }
    if tables.is_empty() {
        tx.rollback().await?;
        anyhow::bail!("Pass at least one --table or an --owner role");
    }

    let listed = TriggerInventory::new().list_triggers(&mut tx, &namespace, &tables).await;
    tx.rollback().await?;
    let triggers = listed?;

    if triggers.is_empty() {
        return output_empty_collection(&output_format, "triggers", "No triggers found");
    }

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "triggers": triggers }))?);
        }
        OutputFormat::Text => {
            println!("{:<20} {:<24} {:<10} {:<24} {:<10} {}", "TABLE", "TRIGGER", "TIMING", "EVENTS", "LEVEL", "FUNCTION");
            println!("{}", "-".repeat(110));

            for trigger in &triggers {
                let events = trigger
                    .events
                    .iter()
                    .map(|e| e.as_sql())
                    .collect::<Vec<_>>()
                    .join(" OR ");
                let level = if trigger.for_each_row { "ROW" } else { "STATEMENT" };
                println!(
                    "{:<20} {:<24} {:<10} {:<24} {:<10} {}",
                    trigger.table_name,
                    trigger.trigger_name,
                    trigger.timing.as_sql(),
                    events,
                    level,
                    trigger.qualified_function()
                );
            }
        }
    }

    Ok(())
}
