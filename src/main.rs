use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokenguard::config::{self, Config};
use tokenguard::issuer::TokenIssuer;
use tokenguard::keys::SigningKeys;
use tokenguard::models::OwnerRef;
use tokenguard::store::{PgTokenStore, TokenStore};
use tokenguard::validator::{self, TokenValidator};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tokenguard=info,tokenctl=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Cli::parse();
    let cfg = config::load()?;

    let result = run(args.command, &cfg).await;
    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run(command: cli::Commands, cfg: &Config) -> anyhow::Result<()> {
    match command {
        cli::Commands::Inspect { token } => {
            let parsed = validator::parse(&token)?;
            let out = serde_json::json!({
                "header": parsed.header,
                "claims": parsed.claims,
                "issued_at": parsed.claims.issued_at().to_rfc3339(),
                "not_before": parsed.claims.not_before().to_rfc3339(),
                "expires_at": parsed.claims.expires_at().to_rfc3339(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        cli::Commands::Verify { token, kind } => {
            let keys = Arc::new(SigningKeys::from_config(cfg)?);
            let validator = TokenValidator::new(keys).with_leeway(cfg.leeway);
            match validator.parse_as(&token, kind.into(), chrono::Utc::now()) {
                Ok(parsed) => println!(
                    "valid {} (record {}, expires {})",
                    parsed.claims.sub,
                    parsed.claims.jti,
                    parsed.claims.expires_at().to_rfc3339()
                ),
                Err(e) => {
                    println!("invalid: {}", e);
                    std::process::exit(1);
                }
            }
        }
        cli::Commands::Issue {
            owner_type,
            owner_id,
            name,
            package,
            scopes,
        } => {
            let keys = Arc::new(SigningKeys::from_config(cfg)?);
            let store = connect(cfg).await?;
            let issuer = TokenIssuer::from_config(cfg, keys, store)?;
            let owner = OwnerRef::new(owner_type, owner_id);

            let pair = issuer
                .issue_with_scopes(&owner, &name, &package, scopes)
                .await?
                .context("owner has no persisted identity")?;
            println!("{}", serde_json::to_string_pretty(&pair)?);
        }
        cli::Commands::Revoke { id } => {
            let store = connect(cfg).await?;
            if store.delete(id).await? {
                println!("Token {} revoked.", id);
            } else {
                println!("Token {} not found.", id);
            }
        }
        cli::Commands::List {
            owner_type,
            owner_id,
        } => {
            let store = connect(cfg).await?;
            let records = store.list_for_owner(&owner_type, &owner_id).await?;
            if records.is_empty() {
                println!("No tokens found.");
            }
            for r in records {
                println!(
                    "{:<8} {:<20} {:<24} access until {}  refresh until {}  scopes [{}]",
                    r.id,
                    r.name,
                    r.package,
                    r.access_token_expire_at.to_rfc3339(),
                    r.refresh_token_expire_at.to_rfc3339(),
                    r.scopes.join(",")
                );
            }
        }
        cli::Commands::Migrate => {
            let url = database_url(cfg)?;
            let store = PgTokenStore::connect(url).await?;
            tracing::info!("Running migrations...");
            store.migrate().await?;
            println!("Migrations applied.");
        }
    }
    Ok(())
}

fn database_url(cfg: &Config) -> anyhow::Result<&str> {
    cfg.database_url
        .as_deref()
        .context("TOKEN_CONNECTION is not set")
}

async fn connect(cfg: &Config) -> anyhow::Result<Arc<dyn TokenStore>> {
    let store = PgTokenStore::connect(database_url(cfg)?)
        .await?
        .with_table(&cfg.table)?;
    Ok(Arc::new(store))
}
