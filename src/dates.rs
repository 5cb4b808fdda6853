//! Dates as they are written in bulletins and bulletin URLs.
//!
//! Bulletins spell dates in Italian (`30 marzo 2020`) and now and then use
//! the letter `o` where a zero belongs, so every numeric part accepts it.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const ITALIAN_MONTHS: [&str; 12] = [
    "gennaio",
    "febbraio",
    "marzo",
    "aprile",
    "maggio",
    "giugno",
    "luglio",
    "agosto",
    "settembre",
    "ottobre",
    "novembre",
    "dicembre",
];

/// Regex source for `<day><sep><month><sep><year>` with named groups.
pub fn italian_date_pattern(sep: &str) -> String {
    format!(
        r"(?P<day>[o0-2]?[o0-9]|3[o0-1]){sep}(?P<month>{months}){sep}(?P<year>[o0-9]{{4}})",
        months = ITALIAN_MONTHS.join("|"),
    )
}

static REPORT_DATETIME: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"(?i){}[- ]* ore (?P<hour>[o0-2]?[o0-9]):(?P<minute>[o0-5][o0-9])",
        italian_date_pattern("[ ]?")
    );
    Regex::new(&pattern).expect("report datetime pattern is valid")
});

static LINK_ITALIAN_DATE: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(r"(?i)(?:^|\D){}(?:\D|$)", italian_date_pattern("[-_ ]"));
    Regex::new(&pattern).expect("link date pattern is valid")
});

static LINK_ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\D)(?P<year>\d{4})[-_](?P<month>\d{2})[-_](?P<day>\d{2})(?:\D|$)")
        .expect("ISO date pattern is valid")
});

fn number(caps: &Captures<'_>, name: &str) -> Option<u32> {
    caps.name(name)?
        .as_str()
        .to_ascii_lowercase()
        .replace('o', "0")
        .parse()
        .ok()
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    ITALIAN_MONTHS
        .iter()
        .position(|m| *m == name)
        .map(|i| i as u32 + 1)
}

fn italian_date(caps: &Captures<'_>) -> Option<NaiveDate> {
    let month = month_number(caps.name("month")?.as_str())?;
    let year = number(caps, "year")? as i32;
    NaiveDate::from_ymd_opt(year, month, number(caps, "day")?)
}

/// Finds the publication datetime (`30 marzo 2020 - ore 16:00`) in the text
/// of a bulletin's first page.
pub fn find_report_datetime(text: &str) -> Option<NaiveDateTime> {
    let caps = REPORT_DATETIME.captures(text)?;
    italian_date(&caps)?.and_hms_opt(number(&caps, "hour")?, number(&caps, "minute")?, 0)
}

/// Extracts the bulletin date from a link target such as
/// `Bollettino-sorveglianza-integrata-COVID-19_30-marzo-2020.pdf` or
/// `..._2020-10-20.pdf`.
pub fn date_in_link(href: &str) -> Option<NaiveDate> {
    if let Some(caps) = LINK_ISO_DATE.captures(href) {
        let year = number(&caps, "year")? as i32;
        return NaiveDate::from_ymd_opt(year, number(&caps, "month")?, number(&caps, "day")?);
    }
    LINK_ITALIAN_DATE
        .captures(href)
        .and_then(|caps| italian_date(&caps))
}
