// src/extract/mod.rs

pub mod table;

use chrono::NaiveDateTime;
use lopdf::Document;
use tracing::{debug, info, instrument};

use crate::dates::find_report_datetime;
use crate::error::ExtractError;
use crate::record::{derive_records, Counts, Record};
use table::RawRow;

/// Reports whose printed percentage columns do not add up to 100.
const PERCENTAGE_SUM_EXEMPT: &[&str] = &["2020-12-09"];

/// Rounding in the printed table allows this much slack on column sums.
const PERCENTAGE_SUM_TOLERANCE: f64 = 0.1;

/// The table as printed in a bulletin, plus its publication time.
#[derive(Debug, Clone)]
pub struct RawBulletin {
    pub datetime: NaiveDateTime,
    pub rows: Vec<RawRow>,
}

/// A bulletin's table after checks, with derived columns recomputed.
#[derive(Debug, Clone)]
pub struct Bulletin {
    pub datetime: NaiveDateTime,
    pub records: Vec<Record>,
}

/// Reads the age/sex table out of a bulletin document.
///
/// Implementors only locate and tokenize the table in `extract_raw`; the
/// provided `extract` runs the sanity checks and derives every rate.
pub trait TableExtractor {
    fn extract_raw(&self, pdf: &[u8]) -> Result<RawBulletin, ExtractError>;

    fn extract(&self, pdf: &[u8]) -> Result<Bulletin, ExtractError> {
        let raw = self.extract_raw(pdf)?;
        check_raw(&raw)?;
        let counts: Vec<Counts> = raw.rows.iter().map(|r| r.counts.clone()).collect();
        Ok(Bulletin {
            datetime: raw.datetime,
            records: derive_records(raw.datetime, &counts),
        })
    }
}

/// Checks that hold for every well-formed bulletin table.
pub fn check_raw(raw: &RawBulletin) -> Result<(), ExtractError> {
    for row in &raw.rows {
        row.counts.check_sex_sums()?;
    }

    let date = raw.datetime.date().format("%Y-%m-%d").to_string();
    if PERCENTAGE_SUM_EXEMPT.contains(&date.as_str()) {
        info!(%date, "skipping percentage sum check for known malformed report");
        return Ok(());
    }

    let columns: [(&'static str, fn(&RawRow) -> (u64, f64)); 2] = [
        ("cases_percentage", |r| (r.counts.cases, r.cases_percentage)),
        ("deaths_percentage", |r| (r.counts.deaths, r.deaths_percentage)),
    ];
    for (column, get) in columns {
        let (total, sum) = raw
            .rows
            .iter()
            .map(get)
            .fold((0u64, 0.0f64), |(t, s), (n, p)| (t + n, s + p));
        // Nothing to distribute, so every cell is printed as `-`.
        if total == 0 {
            continue;
        }
        if !((sum - 100.0).abs() <= PERCENTAGE_SUM_TOLERANCE) {
            return Err(ExtractError::PercentageSum { column, sum });
        }
    }
    Ok(())
}

/// Extracts text with lopdf, one page at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTableExtractor;

impl PdfTableExtractor {
    fn page_text(doc: &Document, page: u32) -> Result<String, ExtractError> {
        // Text comes out broken over many superfluous lines.
        Ok(doc.extract_text(&[page])?.replace('\n', ""))
    }
}

impl TableExtractor for PdfTableExtractor {
    #[instrument(level = "debug", skip(self, pdf), fields(bytes = pdf.len()))]
    fn extract_raw(&self, pdf: &[u8]) -> Result<RawBulletin, ExtractError> {
        let doc = Document::load_mem(pdf)?;
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        let (&first, rest) = pages.split_first().ok_or(ExtractError::TableNotFound)?;

        let datetime = find_report_datetime(&Self::page_text(&doc, first)?)
            .ok_or(ExtractError::Datetime)?;
        debug!(%datetime, pages = pages.len(), "found report datetime");

        // The table is never on the cover page.
        for &page in rest {
            let text = Self::page_text(&doc, page)?;
            if table::is_table_page(&text) {
                debug!(page, "found table page");
                let rows = table::parse_table(&text)?;
                return Ok(RawBulletin { datetime, rows });
            }
        }
        Err(ExtractError::TableNotFound)
    }
}
