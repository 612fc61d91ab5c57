use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::cli::OutputFormat;
use crate::config::AppConfig;

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Mint a signed bearer token carrying a tenant claim")]
    Mint {
        #[arg(long, help = "Tenant ID for the tenantId claim")]
        tenant: Uuid,

        #[arg(long, help = "Subject (user id)")]
        sub: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        role: Option<String>,

        #[arg(long, help = "Lifetime in hours (defaults to the configured expiry)")]
        hours: Option<u64>,
    },
}

pub fn handle(cmd: TokenCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Mint { tenant, sub, email, role, hours } => {
            if config.security.jwt_secret.is_empty() {
                anyhow::bail!("JWT_SECRET must be set to mint tokens");
            }

            let mut claims = Claims::new(sub, Some(tenant.to_string()), hours.unwrap_or(config.security.jwt_expiry_hours));
            if let Some(email) = email {
                claims = claims.with_email(email);
            }
            if let Some(role) = role {
                claims = claims.with_role(role);
            }

            let token = generate_jwt(&claims, &config.security.jwt_secret)?;
            match output_format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "token": token, "expires_at": claims.exp }))?
                ),
                OutputFormat::Text => println!("{}", token),
            }
            Ok(())
        }
    }
}
