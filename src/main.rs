use anyhow::{Context, Result};
use iccas::{
    archive::Archive,
    config::{self, UpdateConfig},
    extract::PdfTableExtractor,
    fetch,
    update::{run_update, HttpSource},
};
use std::{env, io, path::PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    // stdout is reserved for the list of changed files.
    config::load_dotenv();
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
    info!("startup");

    // ─── 2) configure dirs ───────────────────────────────────────────
    let cfg = UpdateConfig::from_env().context("loading configuration")?;
    let archive = Archive::open(&cfg.data_dir)
        .with_context(|| format!("opening archive at {}", cfg.data_dir.display()))?;
    info!(data_dir = %cfg.data_dir.display(), reports_dir = %cfg.reports_dir.display(), "archive ready");

    // ─── 3) discover, extract, append ────────────────────────────────
    let source = HttpSource::new(
        fetch::build_client()?,
        cfg.index_url.clone(),
        cfg.reports_dir.clone(),
        cfg.retry,
    );
    let report = run_update(&archive, &source, &PdfTableExtractor, cfg.since).await?;

    // ─── 4) signal changes to the caller ─────────────────────────────
    report.write_changes(io::stdout().lock())?;
    if let Some(path) = env::var_os("GITHUB_OUTPUT").map(PathBuf::from) {
        report.write_github_output(&path)?;
    }
    info!(
        written = report.written.len(),
        skipped = report.skipped,
        failed = report.failed.len(),
        "all done"
    );

    if !report.is_success() {
        for (date, reason) in &report.failed {
            warn!(%date, "not archived: {}", reason);
        }
        if let Some(reason) = &report.rebuild_error {
            warn!("{}", reason);
        }
        anyhow::bail!(
            "{} bulletin(s) could not be processed; full dataset {}",
            report.failed.len(),
            if report.rebuild_error.is_some() { "not rebuilt" } else { "up to date" }
        );
    }
    Ok(())
}
