use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub const DATED_PREFIX: &str = "iccas_";
pub const DATED_EXT: &str = ".csv";
pub const FULL_FILE_NAME: &str = "iccas_full.csv";
pub const BY_DATE_DIR: &str = "by-date";

/// Byte range of the `yyyy-mm-dd` part in `iccas_yyyy-mm-dd.csv`.
const DATE_RANGE: std::ops::Range<usize> = DATED_PREFIX.len()..DATED_PREFIX.len() + 10;

pub fn dated_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", DATED_PREFIX, date.format("%Y-%m-%d"), DATED_EXT)
}

/// Extracts the date from a DatedFile name. Anything that does not match
/// `iccas_<yyyy-mm-dd>.csv` exactly (including `iccas_full.csv`) is `None`.
pub fn date_from_file_name(name: &str) -> Option<NaiveDate> {
    if name.len() != DATE_RANGE.end + DATED_EXT.len()
        || !name.starts_with(DATED_PREFIX)
        || !name.ends_with(DATED_EXT)
    {
        return None;
    }
    let raw = name.get(DATE_RANGE)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

pub fn date_from_path(path: &Path) -> Option<NaiveDate> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(date_from_file_name)
}

pub fn report_path(reports_dir: &Path, date: NaiveDate) -> PathBuf {
    reports_dir.join(format!("{}.pdf", date.format("%Y-%m-%d")))
}
