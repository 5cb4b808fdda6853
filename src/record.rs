// src/record.rs

use std::{collections::HashSet, fmt};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Age brackets used by the bulletin table, in table order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeGroup {
    #[serde(rename = "0-9")]
    Age0To9,
    #[serde(rename = "10-19")]
    Age10To19,
    #[serde(rename = "20-29")]
    Age20To29,
    #[serde(rename = "30-39")]
    Age30To39,
    #[serde(rename = "40-49")]
    Age40To49,
    #[serde(rename = "50-59")]
    Age50To59,
    #[serde(rename = "60-69")]
    Age60To69,
    #[serde(rename = "70-79")]
    Age70To79,
    #[serde(rename = "80-89")]
    Age80To89,
    #[serde(rename = ">=90")]
    Age90Plus,
    #[serde(rename = "unknown")]
    Unknown,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 11] = [
        AgeGroup::Age0To9,
        AgeGroup::Age10To19,
        AgeGroup::Age20To29,
        AgeGroup::Age30To39,
        AgeGroup::Age40To49,
        AgeGroup::Age50To59,
        AgeGroup::Age60To69,
        AgeGroup::Age70To79,
        AgeGroup::Age80To89,
        AgeGroup::Age90Plus,
        AgeGroup::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Age0To9 => "0-9",
            AgeGroup::Age10To19 => "10-19",
            AgeGroup::Age20To29 => "20-29",
            AgeGroup::Age30To39 => "30-39",
            AgeGroup::Age40To49 => "40-49",
            AgeGroup::Age50To59 => "50-59",
            AgeGroup::Age60To69 => "60-69",
            AgeGroup::Age70To79 => "70-79",
            AgeGroup::Age80To89 => "80-89",
            AgeGroup::Age90Plus => ">=90",
            AgeGroup::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw counts for one age group, as read from a bulletin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counts {
    pub age_group: AgeGroup,
    pub cases: u64,
    pub deaths: u64,
    pub male_cases: u64,
    pub female_cases: u64,
    pub male_deaths: u64,
    pub female_deaths: u64,
}

impl Counts {
    /// Totals include people of unknown sex, so the split may fall short of
    /// them but never exceed them.
    pub fn check_sex_sums(&self) -> Result<(), RecordError> {
        for (what, male, female, total) in [
            ("cases", self.male_cases, self.female_cases, self.cases),
            ("deaths", self.male_deaths, self.female_deaths, self.deaths),
        ] {
            match male.checked_add(female) {
                Some(sum) if sum <= total => {}
                sum => {
                    return Err(RecordError::SexSumExceedsTotal {
                        age_group: self.age_group,
                        what,
                        sum: sum.unwrap_or(u64::MAX),
                        total,
                    });
                }
            }
        }
        Ok(())
    }
}

/// One row of the dataset. Derived columns are only ever filled in by
/// [`derive_records`]; `None` marks a zero denominator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(with = "bulletin_datetime")]
    pub date: NaiveDateTime,
    pub age_group: AgeGroup,
    pub cases: u64,
    pub deaths: u64,
    pub male_cases: u64,
    pub female_cases: u64,
    pub male_deaths: u64,
    pub female_deaths: u64,
    pub cases_percentage: Option<f64>,
    pub deaths_percentage: Option<f64>,
    pub fatality_rate: Option<f64>,
    pub male_cases_percentage: f64,
    pub female_cases_percentage: f64,
    pub male_deaths_percentage: f64,
    pub female_deaths_percentage: f64,
    pub male_fatality_rate: Option<f64>,
    pub female_fatality_rate: Option<f64>,
}

impl Record {
    pub fn counts(&self) -> Counts {
        Counts {
            age_group: self.age_group,
            cases: self.cases,
            deaths: self.deaths,
            male_cases: self.male_cases,
            female_cases: self.female_cases,
            male_deaths: self.male_deaths,
            female_deaths: self.female_deaths,
        }
    }
}

fn percent(num: u64, den: u64) -> Option<f64> {
    (den != 0).then(|| num as f64 * 100.0 / den as f64)
}

// Share of one sex among cases (or deaths) of known sex.
fn share(num: u64, known: u64) -> f64 {
    percent(num, known).unwrap_or(0.0)
}

/// Computes every derived column for the rows of one bulletin. Overall
/// percentages are relative to the bulletin totals, so all rows of a
/// bulletin must be passed together.
pub fn derive_records(date: NaiveDateTime, rows: &[Counts]) -> Vec<Record> {
    let total_cases = rows.iter().map(|r| r.cases).fold(0, u64::saturating_add);
    let total_deaths = rows.iter().map(|r| r.deaths).fold(0, u64::saturating_add);

    rows.iter()
        .map(|r| {
            let known_cases = r.male_cases.saturating_add(r.female_cases);
            let known_deaths = r.male_deaths.saturating_add(r.female_deaths);
            Record {
                date,
                age_group: r.age_group,
                cases: r.cases,
                deaths: r.deaths,
                male_cases: r.male_cases,
                female_cases: r.female_cases,
                male_deaths: r.male_deaths,
                female_deaths: r.female_deaths,
                cases_percentage: percent(r.cases, total_cases),
                deaths_percentage: percent(r.deaths, total_deaths),
                fatality_rate: percent(r.deaths, r.cases),
                male_cases_percentage: share(r.male_cases, known_cases),
                female_cases_percentage: share(r.female_cases, known_cases),
                male_deaths_percentage: share(r.male_deaths, known_deaths),
                female_deaths_percentage: share(r.female_deaths, known_deaths),
                male_fatality_rate: percent(r.male_deaths, r.male_cases),
                female_fatality_rate: percent(r.female_deaths, r.female_cases),
            }
        })
        .collect()
}

/// Checks a DatedFile's worth of records before it is written.
pub fn validate_batch(date: NaiveDate, records: &[Record]) -> Result<(), RecordError> {
    if records.len() != AgeGroup::ALL.len() {
        return Err(RecordError::RowCount {
            expected: AgeGroup::ALL.len(),
            found: records.len(),
        });
    }
    let mut seen = HashSet::with_capacity(records.len());
    for rec in records {
        let found = rec.date.date();
        if found != date {
            return Err(RecordError::DateMismatch {
                expected: date,
                found,
            });
        }
        if !seen.insert(rec.age_group) {
            return Err(RecordError::DuplicateAgeGroup(rec.age_group));
        }
        rec.counts().check_sex_sums()?;
    }
    Ok(())
}

/// `yyyy-mm-ddThh:mm`, the datetime format of the `date` column.
pub mod bulletin_datetime {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M";

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&dt.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
