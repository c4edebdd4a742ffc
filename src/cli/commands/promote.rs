use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::cli::utils::*;
use crate::cli::{connect, OutputFormat};
use crate::config::config;
use crate::services::central::CentralClient;
use crate::services::promotion::{PromotionCoordinator, PromotionOutcome};

#[derive(Args)]
pub struct PromoteArgs {
    #[arg(long, help = "Organization ID")]
    pub organization: Uuid,

    #[arg(long, help = "Member (user) ID")]
    pub member: Uuid,
}

pub async fn handle(args: PromoteArgs, database: Option<&str>, output_format: OutputFormat) -> anyhow::Result<()> {
    let catalog = connect(database).await?;
    let accounts = CentralClient::from_config(&config().central)?;
    let coordinator = PromotionCoordinator::from_config(catalog, config(), accounts);

    match coordinator.promote_to_admin(args.organization, args.member).await {
        Ok(PromotionOutcome::Promoted(summary)) => {
            if let OutputFormat::Text = output_format {
                for table in &summary.tables_moved {
                    println!("  table   {} -> {}.{}", table, summary.namespace, table);
                }
                for trigger in &summary.triggers_rebuilt {
                    println!("  trigger {}.{}", summary.namespace, trigger);
                }
            }
            output_success(
                &output_format,
                &format!("Promoted '{}' to owner, schema '{}'", summary.username, summary.namespace),
                Some(json!({ "promotion": summary })),
            )
        }
        Ok(PromotionOutcome::AlreadyPromoted) => output_success(
            &output_format,
            "Member already owns this organization, nothing to do",
            Some(json!({ "promotion": PromotionOutcome::AlreadyPromoted })),
        ),
        Err(e) => {
            if let OutputFormat::Json = output_format {
                output_error(&output_format, &e.to_string(), Some(e.error_code()))?;
            }
            Err(e.into())
        }
    }
}
