// src/update.rs

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use std::{
    collections::HashSet,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::archive::{naming::report_path, Archive};
use crate::extract::TableExtractor;
use crate::fetch::{self, BulletinLink, Retry};

/// Where bulletins come from. The HTTP implementation scrapes the index page
/// and downloads PDFs; tests substitute canned documents.
#[allow(async_fn_in_trait)]
pub trait BulletinSource {
    async fn list(&self) -> Result<Vec<BulletinLink>>;
    async fn fetch(&self, link: &BulletinLink) -> Result<Vec<u8>>;
}

pub struct HttpSource {
    client: Client,
    index_url: Url,
    reports_dir: PathBuf,
    retry: Retry,
}

impl HttpSource {
    pub fn new(client: Client, index_url: Url, reports_dir: PathBuf, retry: Retry) -> Self {
        Self {
            client,
            index_url,
            reports_dir,
            retry,
        }
    }
}

impl BulletinSource for HttpSource {
    async fn list(&self) -> Result<Vec<BulletinLink>> {
        fetch::fetch_bulletin_links(&self.client, &self.index_url, self.retry).await
    }

    async fn fetch(&self, link: &BulletinLink) -> Result<Vec<u8>> {
        let dest = report_path(&self.reports_dir, link.date);
        let (_, bytes) = fetch::download_bulletin(&self.client, &link.url, dest, self.retry).await?;
        Ok(bytes)
    }
}

/// What one run of the update did.
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// New DatedFiles, in date order.
    pub written: Vec<PathBuf>,
    /// Set when the aggregate dataset was rewritten.
    pub full: Option<PathBuf>,
    /// Links that turned out to hold an already archived bulletin.
    pub skipped: usize,
    pub failed: Vec<(NaiveDate, String)>,
    /// Set when the aggregate dataset could not be rebuilt.
    pub rebuild_error: Option<String>,
}

impl UpdateReport {
    pub fn changed_files(&self) -> Vec<&Path> {
        self.written
            .iter()
            .chain(self.full.iter())
            .map(PathBuf::as_path)
            .collect()
    }

    pub fn is_changed(&self) -> bool {
        !self.written.is_empty() || self.full.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.rebuild_error.is_none()
    }

    /// One changed path per line.
    pub fn write_changes(&self, mut out: impl Write) -> std::io::Result<()> {
        for path in self.changed_files() {
            writeln!(out, "{}", path.display())?;
        }
        Ok(())
    }

    /// Appends `changed` and `changed_files` to a GitHub Actions output file.
    pub fn write_github_output(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let files: Vec<String> = self
            .changed_files()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        writeln!(file, "changed={}", self.is_changed())?;
        writeln!(file, "changed_files={}", files.join(" "))?;
        Ok(())
    }
}

/// Appends every bulletin that is not archived yet.
///
/// A bulletin that fails to download or parse is recorded in the report and
/// leaves nothing behind; the others are still processed. The aggregate
/// dataset is brought up to date with the archive on every run, and a
/// failure to do so is reported without losing the list of new files.
#[instrument(level = "info", skip_all)]
pub async fn run_update<S, E>(
    archive: &Archive,
    source: &S,
    extractor: &E,
    since: Option<NaiveDate>,
) -> Result<UpdateReport>
where
    S: BulletinSource,
    E: TableExtractor,
{
    let mut report = UpdateReport::default();
    let archived: HashSet<NaiveDate> = archive.dates()?.into_iter().collect();
    info!("{} bulletins already archived", archived.len());

    let pending: Vec<BulletinLink> = source
        .list()
        .await?
        .into_iter()
        .filter(|l| !archived.contains(&l.date))
        .filter(|l| since.map_or(true, |s| l.date >= s))
        .collect();

    if pending.is_empty() {
        info!("no new bulletins");
    } else {
        info!("{} bulletins to process", pending.len());
    }

    for link in &pending {
        match process_bulletin(archive, source, extractor, link).await {
            Ok(Some(path)) => report.written.push(path),
            Ok(None) => report.skipped += 1,
            Err(e) => {
                let reason = format!("{e:#}");
                error!(date = %link.date, url = %link.url, error = %reason, "bulletin failed");
                report.failed.push((link.date, reason));
            }
        }
    }

    // Rebuilt on every run so that an earlier interrupted rebuild is
    // repaired; unchanged content is not rewritten.
    if !archived.is_empty() || !report.written.is_empty() {
        match archive.rebuild_full() {
            Ok((outcome, rows)) => {
                info!(rows, changed = outcome.changed(), "full dataset checked");
                if outcome.changed() {
                    report.full = Some(outcome.path().to_path_buf());
                }
            }
            Err(e) => {
                let reason = format!("rebuilding full dataset: {e}");
                error!(error = %reason, "full dataset not rebuilt");
                report.rebuild_error = Some(reason);
            }
        }
    }

    Ok(report)
}

#[instrument(level = "info", skip(archive, source, extractor, link), fields(date = %link.date))]
async fn process_bulletin<S, E>(
    archive: &Archive,
    source: &S,
    extractor: &E,
    link: &BulletinLink,
) -> Result<Option<PathBuf>>
where
    S: BulletinSource,
    E: TableExtractor,
{
    let bytes = source
        .fetch(link)
        .await
        .with_context(|| format!("fetching {}", link.url))?;
    let bulletin = extractor
        .extract(&bytes)
        .with_context(|| format!("extracting table from {}", link.url))?;

    // The date printed in the bulletin wins over the one in its URL.
    let date = bulletin.datetime.date();
    if date != link.date {
        warn!(link_date = %link.date, report_date = %date, "link and report dates differ");
    }
    if archive.contains(date) {
        info!(%date, "bulletin already archived");
        return Ok(None);
    }

    let outcome = archive.write_dated(date, &bulletin.records)?;
    Ok(outcome.changed().then(|| outcome.path().to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn change_signal_lists_paths_and_flags() -> Result<()> {
        let report = UpdateReport {
            written: vec![PathBuf::from("data/by-date/iccas_2020-03-30.csv")],
            full: Some(PathBuf::from("data/iccas_full.csv")),
            ..Default::default()
        };

        let mut stdout = Vec::new();
        report.write_changes(&mut stdout)?;
        assert_eq!(
            String::from_utf8(stdout)?,
            "data/by-date/iccas_2020-03-30.csv\ndata/iccas_full.csv\n"
        );

        let tmp = tempdir()?;
        let out = tmp.path().join("github_output");
        std::fs::write(&out, "earlier=1\n")?;
        report.write_github_output(&out)?;
        assert_eq!(
            std::fs::read_to_string(&out)?,
            "earlier=1\nchanged=true\nchanged_files=data/by-date/iccas_2020-03-30.csv data/iccas_full.csv\n"
        );
        Ok(())
    }

    #[test]
    fn empty_report_signals_nothing_new() -> Result<()> {
        let report = UpdateReport::default();
        assert!(!report.is_changed());

        let mut stdout = Vec::new();
        report.write_changes(&mut stdout)?;
        assert!(stdout.is_empty());

        let tmp = tempdir()?;
        let out = tmp.path().join("github_output");
        report.write_github_output(&out)?;
        assert_eq!(
            std::fs::read_to_string(&out)?,
            "changed=false\nchanged_files=\n"
        );
        Ok(())
    }
}
