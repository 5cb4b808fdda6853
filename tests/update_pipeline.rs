use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use iccas::{
    archive::{read_records, Archive},
    dates::find_report_datetime,
    error::ExtractError,
    extract::{table::parse_table, RawBulletin, TableExtractor},
    fetch::BulletinLink,
    update::{run_update, BulletinSource},
};
use std::{collections::HashMap, fs};
use tempfile::tempdir;
use url::Url;

const CASES: [u64; 11] = [10, 90, 100, 100, 100, 100, 100, 100, 100, 100, 100];
const DEATHS: [u64; 11] = [0, 0, 0, 0, 1, 4, 5, 10, 30, 40, 10];
const LABELS: [&str; 11] = [
    "0-9", "10-19", "20-29", "30-39", "40-49", "50-59", "60-69", "70-79", "80-89", "≥90",
    "Età non nota",
];

/// Cover page and table page separated by a form feed.
fn bulletin_text(cover_date: &str) -> String {
    let pct = |n: u64, d: u64| format!("{:.1}", n as f64 * 100.0 / d as f64).replace('.', ",");
    let mut table = String::from(
        "Tabella 1 - Distribuzione dei casi diagnosticati per sesso e per fascia di età ",
    );
    for ((cases, deaths), label) in CASES.iter().zip(DEATHS).zip(LABELS) {
        let male_cases = (cases - 1) / 2;
        let female_cases = cases - 1 - male_cases;
        let male_deaths = deaths / 2;
        let female_deaths = deaths - male_deaths;
        table.push_str(label);
        for (c, d) in [
            (male_cases, male_deaths),
            (female_cases, female_deaths),
            (*cases, deaths),
        ] {
            table.push_str(&format!(
                " {} {} {} {} {}",
                c,
                pct(c, 1000),
                d,
                pct(d, 100),
                pct(d, c)
            ));
        }
        table.push(' ');
    }
    format!("Aggiornamento nazionale {cover_date}\u{c}{table}")
}

struct TextExtractor;

impl TableExtractor for TextExtractor {
    fn extract_raw(&self, pdf: &[u8]) -> Result<RawBulletin, ExtractError> {
        let text = String::from_utf8_lossy(pdf);
        let (cover, table) = text.split_once('\u{c}').ok_or(ExtractError::TableNotFound)?;
        Ok(RawBulletin {
            datetime: find_report_datetime(cover).ok_or(ExtractError::Datetime)?,
            rows: parse_table(table)?,
        })
    }
}

#[derive(Default)]
struct StubSource {
    documents: HashMap<NaiveDate, Vec<u8>>,
}

impl StubSource {
    fn with(mut self, date: NaiveDate, body: impl Into<Vec<u8>>) -> Self {
        self.documents.insert(date, body.into());
        self
    }
}

impl BulletinSource for StubSource {
    async fn list(&self) -> Result<Vec<BulletinLink>> {
        let mut links: Vec<BulletinLink> = self
            .documents
            .keys()
            .map(|&date| BulletinLink {
                date,
                url: Url::parse(&format!("https://example.org/bollettino_{date}.pdf")).unwrap(),
            })
            .collect();
        links.sort_by_key(|l| l.date);
        Ok(links)
    }

    async fn fetch(&self, link: &BulletinLink) -> Result<Vec<u8>> {
        self.documents
            .get(&link.date)
            .cloned()
            .ok_or_else(|| anyhow!("404 for {}", link.url))
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn appends_new_bulletins_and_rebuilds_full_dataset() -> Result<()> {
    let tmp = tempdir()?;
    let archive = Archive::open(tmp.path().join("data"))?;
    let source = StubSource::default()
        .with(ymd(2020, 3, 28), bulletin_text("28 marzo 2020 - ore 16:00"))
        .with(ymd(2020, 3, 30), bulletin_text("30 marzo 2020 - ore 16:00"));

    let report = run_update(&archive, &source, &TextExtractor, None).await?;
    assert_eq!(report.written.len(), 2);
    assert!(report.failed.is_empty());
    assert_eq!(report.full.as_deref(), Some(archive.full_path().as_path()));
    assert_eq!(report.changed_files().len(), 3);

    let full = read_records(&archive.full_path())?;
    let per_file: usize = archive
        .dated_files()?
        .iter()
        .map(|p| read_records(p).map(|r| r.len()))
        .sum::<Result<usize, _>>()?;
    assert_eq!(full.len(), 22);
    assert_eq!(full.len(), per_file);

    for rec in &full {
        assert!(rec.male_cases + rec.female_cases <= rec.cases);
        assert!(rec.male_deaths + rec.female_deaths <= rec.deaths);
        assert!((0.0..=100.0).contains(&rec.male_cases_percentage));
        assert!((0.0..=100.0).contains(&rec.female_cases_percentage));
    }
    assert_eq!(full[0].cases_percentage, Some(1.0));
    Ok(())
}

#[tokio::test]
async fn second_run_finds_nothing_new_and_changes_nothing() -> Result<()> {
    let tmp = tempdir()?;
    let archive = Archive::open(tmp.path())?;
    let source =
        StubSource::default().with(ymd(2020, 3, 30), bulletin_text("30 marzo 2020 - ore 16:00"));

    run_update(&archive, &source, &TextExtractor, None).await?;
    let dated = fs::read(archive.dated_path(ymd(2020, 3, 30)))?;
    let full = fs::read(archive.full_path())?;

    let again = run_update(&archive, &source, &TextExtractor, None).await?;
    assert!(!again.is_changed());
    assert!(again.changed_files().is_empty());
    assert_eq!(fs::read(archive.dated_path(ymd(2020, 3, 30)))?, dated);
    assert_eq!(fs::read(archive.full_path())?, full);
    Ok(())
}

#[tokio::test]
async fn reprocessing_a_bulletin_yields_identical_content() -> Result<()> {
    let first = tempdir()?;
    let second = tempdir()?;
    let source =
        StubSource::default().with(ymd(2020, 4, 2), bulletin_text("2 aprile 2020 - ore 16:00"));

    let a = Archive::open(first.path())?;
    let b = Archive::open(second.path())?;
    run_update(&a, &source, &TextExtractor, None).await?;
    run_update(&b, &source, &TextExtractor, None).await?;

    assert_eq!(
        fs::read(a.dated_path(ymd(2020, 4, 2)))?,
        fs::read(b.dated_path(ymd(2020, 4, 2)))?
    );
    Ok(())
}

#[tokio::test]
async fn broken_bulletin_leaves_no_partial_file() -> Result<()> {
    let tmp = tempdir()?;
    let archive = Archive::open(tmp.path())?;
    let truncated: String = bulletin_text("29 marzo 2020 - ore 16:00")
        .chars()
        .take(300)
        .collect();
    let source = StubSource::default()
        .with(ymd(2020, 3, 29), truncated)
        .with(ymd(2020, 3, 30), bulletin_text("30 marzo 2020 - ore 16:00"));

    let report = run_update(&archive, &source, &TextExtractor, None).await?;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, ymd(2020, 3, 29));
    assert_eq!(report.written.len(), 1);
    assert!(!archive.contains(ymd(2020, 3, 29)));
    assert_eq!(archive.dates()?, vec![ymd(2020, 3, 30)]);
    assert_eq!(fs::read_dir(archive.by_date_dir())?.count(), 1);
    Ok(())
}

#[tokio::test]
async fn since_skips_older_bulletins() -> Result<()> {
    let tmp = tempdir()?;
    let archive = Archive::open(tmp.path())?;
    let source = StubSource::default()
        .with(ymd(2020, 3, 28), bulletin_text("28 marzo 2020 - ore 16:00"))
        .with(ymd(2020, 3, 30), bulletin_text("30 marzo 2020 - ore 16:00"));

    let report = run_update(&archive, &source, &TextExtractor, Some(ymd(2020, 3, 29))).await?;
    assert_eq!(report.written.len(), 1);
    assert_eq!(archive.dates()?, vec![ymd(2020, 3, 30)]);
    Ok(())
}

#[tokio::test]
async fn report_date_wins_over_link_date() -> Result<()> {
    let tmp = tempdir()?;
    let archive = Archive::open(tmp.path())?;
    // Published under the 31st, but the document is the bulletin of the 30th.
    let source = StubSource::default()
        .with(ymd(2020, 3, 30), bulletin_text("30 marzo 2020 - ore 16:00"))
        .with(ymd(2020, 3, 31), bulletin_text("30 marzo 2020 - ore 16:00"));

    let report = run_update(&archive, &source, &TextExtractor, None).await?;
    assert_eq!(report.written.len(), 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(archive.dates()?, vec![ymd(2020, 3, 30)]);
    Ok(())
}

#[tokio::test]
async fn missing_full_dataset_is_rebuilt_without_new_bulletins() -> Result<()> {
    let tmp = tempdir()?;
    let archive = Archive::open(tmp.path())?;
    let source =
        StubSource::default().with(ymd(2020, 3, 30), bulletin_text("30 marzo 2020 - ore 16:00"));
    run_update(&archive, &source, &TextExtractor, None).await?;

    // As left behind by a run interrupted before the rebuild.
    fs::remove_file(archive.full_path())?;

    let report = run_update(&archive, &StubSource::default(), &TextExtractor, None).await?;
    assert!(report.written.is_empty());
    assert_eq!(report.full.as_deref(), Some(archive.full_path().as_path()));
    assert!(report.is_changed());
    assert!(report.is_success());
    assert_eq!(read_records(&archive.full_path())?.len(), 11);
    Ok(())
}

#[tokio::test]
async fn idle_run_on_empty_archive_writes_nothing() -> Result<()> {
    let tmp = tempdir()?;
    let archive = Archive::open(tmp.path())?;

    let report = run_update(&archive, &StubSource::default(), &TextExtractor, None).await?;
    assert!(!report.is_changed());
    assert!(report.is_success());
    assert!(!archive.full_path().exists());
    Ok(())
}

#[tokio::test]
async fn failed_rebuild_still_reports_new_files() -> Result<()> {
    let tmp = tempdir()?;
    let archive = Archive::open(tmp.path())?;
    let first =
        StubSource::default().with(ymd(2020, 3, 30), bulletin_text("30 marzo 2020 - ore 16:00"));
    run_update(&archive, &first, &TextExtractor, None).await?;
    // Same rows under a second name, so the rebuild sees duplicate keys.
    fs::copy(
        archive.dated_path(ymd(2020, 3, 30)),
        archive.dated_path(ymd(2020, 3, 31)),
    )?;

    let second =
        StubSource::default().with(ymd(2020, 4, 2), bulletin_text("2 aprile 2020 - ore 16:00"));
    let report = run_update(&archive, &second, &TextExtractor, None).await?;
    assert_eq!(report.written, vec![archive.dated_path(ymd(2020, 4, 2))]);
    assert!(report.full.is_none());
    assert!(report.rebuild_error.is_some());
    assert!(!report.is_success());
    assert!(report.is_changed());
    Ok(())
}
