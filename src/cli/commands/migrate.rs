use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::DatabaseManager;

pub async fn handle(config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = DatabaseManager::connect(&config.database, config.tenancy.binding).await?;
    DatabaseManager::migrate(&pool).await?;
    pool.close().await;
    output_success(output_format, "Tenancy schema applied", None)
}
