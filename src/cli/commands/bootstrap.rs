use crate::cli::utils::*;
use crate::cli::{connect, OutputFormat};

pub async fn handle(database: Option<&str>, output_format: OutputFormat) -> anyhow::Result<()> {
    let catalog = connect(database).await?;
    catalog.bootstrap().await?;

    output_success(
        &output_format,
        &format!("Catalog tables ready in {}", database.unwrap_or("the default database")),
        None,
    )
}
