use clap::Args;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::services::quota_trigger::QuotaTriggerBuilder;

#[derive(Args)]
pub struct QuotaSqlArgs {
    #[arg(long, help = "Schema the table lives in")]
    pub namespace: String,

    #[arg(long, help = "Table name")]
    pub table: String,

    #[arg(long, help = "Quota limit in bytes")]
    pub limit: i64,
}

pub fn handle(args: QuotaSqlArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let definition = QuotaTriggerBuilder::new().build(&args.namespace, &args.table, args.limit);

    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "function_sql": definition.function_sql(),
                    "trigger_sql": definition.trigger_sql(),
                }))?
            );
        }
        OutputFormat::Text => {
            println!("{};", definition.function_sql());
            println!();
            println!("{};", definition.trigger_sql());
        }
    }

    Ok(())
}
