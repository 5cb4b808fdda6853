use anyhow::{Context, Result};
use iccas::{
    archive::naming::BY_DATE_DIR,
    badge::{latest_date_label, publish, BadgeDocument},
    config::{self, BadgeConfig},
    fetch,
};
use std::{env, io};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    config::load_dotenv();
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let cfg = BadgeConfig::from_env().context("loading configuration")?;
    // Read-only: a missing archive must fail rather than be created.
    let date = latest_date_label(&cfg.data_dir.join(BY_DATE_DIR))
        .context("cannot derive the latest data date")?;
    let doc = BadgeDocument::new(&cfg.label, &date, &cfg.color);
    info!(label = %doc.label, message = %doc.message, "badge ready");

    match (&cfg.gist, cfg.dry_run) {
        (Some(target), false) => {
            let client = fetch::build_client()?;
            publish(&client, target, &cfg.filename, &doc).await?;
        }
        _ => println!("{}", serde_json::to_string_pretty(&doc)?),
    }
    Ok(())
}
