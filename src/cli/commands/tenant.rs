use clap::Subcommand;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cli::utils::{output_record, output_success};
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::models::TenantRow;
use crate::database::DatabaseManager;

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "Show a tenant")]
    Show {
        #[arg(help = "Tenant ID")]
        id: Uuid,
    },

    #[command(about = "Register a tenant (no-op if the id already exists)")]
    Create {
        #[arg(long, help = "Display name")]
        name: String,

        #[arg(long, help = "Unique slug")]
        slug: String,

        #[arg(long, help = "Tenant ID (generated when omitted)")]
        id: Option<Uuid>,

        #[arg(long, help = "Domain the tenant is served on")]
        domain: Option<String>,
    },
}

pub async fn handle(cmd: TenantCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = DatabaseManager::connect(&config.database, config.tenancy.binding).await?;

    let result = match cmd {
        TenantCommands::Show { id } => {
            let tenant = find(&pool, id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Tenant {} not found", id))?;
            output_record(output_format, &serde_json::to_value(&tenant)?)
        }
        TenantCommands::Create { name, slug, id, domain } => {
            let tenant = create(&pool, id, &name, &slug, domain.as_deref()).await?;
            output_success(
                output_format,
                &format!("Tenant {} ({})", tenant.slug, tenant.id),
                Some(serde_json::to_value(&tenant)?),
            )
        }
    };

    pool.close().await;
    result
}

async fn find(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<TenantRow>> {
    let tenant = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(tenant)
}

async fn create(pool: &PgPool, id: Option<Uuid>, name: &str, slug: &str, domain: Option<&str>) -> anyhow::Result<TenantRow> {
    let inserted = sqlx::query_as::<_, TenantRow>(
        r#"
        INSERT INTO tenants (id, name, slug, domain)
        VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4)
        ON CONFLICT (id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(slug)
    .bind(domain)
    .fetch_optional(pool)
    .await?;

    match (inserted, id) {
        (Some(tenant), _) => {
            tracing::info!("Created tenant {} ({})", tenant.slug, tenant.id);
            Ok(tenant)
        }
        (None, Some(id)) => find(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Tenant {} could not be created", id)),
        (None, None) => Err(anyhow::anyhow!("Tenant '{}' could not be created", slug)),
    }
}
