// src/extract/table.rs
//
// Turns the text of the table page into raw rows. Text extraction loses the
// table grid, so rows are recovered by counting tokens.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ExtractError;
use crate::record::{AgeGroup, Counts};

pub const NUM_ROWS: usize = 11;

/// Columns per row: age group, then male, female and overall blocks of
/// (cases, cases %, deaths, deaths %, fatality rate).
pub const NUM_COLUMNS: usize = 16;

const BLOCK_FIELDS: [&str; 5] = [
    "cases",
    "cases_percentage",
    "deaths",
    "deaths_percentage",
    "fatality_rate",
];

static TABLE_CAPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)tabella [0-9- ]+ distribuzione dei casi .+ per fascia di et. ")
        .expect("caption pattern is valid")
});

static UNKNOWN_AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(età non nota|non not[ao])").expect("unknown age pattern is valid")
});

/// One table row as printed, before derived columns are recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub counts: Counts,
    /// Reported share of all cases, used only for sanity checks.
    pub cases_percentage: f64,
    pub deaths_percentage: f64,
}

pub fn is_table_page(text: &str) -> bool {
    TABLE_CAPTION.is_match(text)
}

/// `1.234` and `1 234` are thousands; a lone `-` stands for zero.
pub fn parse_int(token: &str, column: &'static str) -> Result<u64, ExtractError> {
    if token == "-" {
        return Ok(0);
    }
    token
        .replace(['.', ' '], "")
        .parse()
        .map_err(|_| ExtractError::Token {
            token: token.to_string(),
            column,
        })
}

/// Decimal comma; a lone `-` stands for zero and an empty cell is NaN.
pub fn parse_float(token: &str, column: &'static str) -> Result<f64, ExtractError> {
    match token {
        "" => Ok(f64::NAN),
        "-" => Ok(0.0),
        _ => token
            .replace(',', ".")
            .parse()
            .map_err(|_| ExtractError::Token {
                token: token.to_string(),
                column,
            }),
    }
}

fn column_name(block: usize, field: usize) -> &'static str {
    const NAMES: [[&str; 5]; 3] = [
        [
            "male_cases",
            "male_cases_percentage",
            "male_deaths",
            "male_deaths_percentage",
            "male_fatality_rate",
        ],
        [
            "female_cases",
            "female_cases_percentage",
            "female_deaths",
            "female_deaths_percentage",
            "female_fatality_rate",
        ],
        BLOCK_FIELDS,
    ];
    NAMES[block][field]
}

struct Block {
    cases: u64,
    cases_percentage: f64,
    deaths: u64,
    deaths_percentage: f64,
}

fn parse_block(tokens: &[&str], block: usize) -> Result<Block, ExtractError> {
    let at = |field: usize| tokens[1 + block * BLOCK_FIELDS.len() + field];
    let block_value = Block {
        cases: parse_int(at(0), column_name(block, 0))?,
        cases_percentage: parse_float(at(1), column_name(block, 1))?,
        deaths: parse_int(at(2), column_name(block, 2))?,
        deaths_percentage: parse_float(at(3), column_name(block, 3))?,
    };
    // Fatality rate is recomputed later but must still be a number.
    parse_float(at(4), column_name(block, 4))?;
    Ok(block_value)
}

fn parse_row(tokens: &[&str], age_group: AgeGroup) -> Result<RawRow, ExtractError> {
    // The last two labels are printed as `≥90` and `Età non nota`; only the
    // plain decade labels are checked.
    if !matches!(age_group, AgeGroup::Age90Plus | AgeGroup::Unknown)
        && tokens[0] != age_group.as_str()
    {
        return Err(ExtractError::Token {
            token: tokens[0].to_string(),
            column: "age_group",
        });
    }

    let male = parse_block(tokens, 0)?;
    let female = parse_block(tokens, 1)?;
    let total = parse_block(tokens, 2)?;

    Ok(RawRow {
        counts: Counts {
            age_group,
            cases: total.cases,
            deaths: total.deaths,
            male_cases: male.cases,
            female_cases: female.cases,
            male_deaths: male.deaths,
            female_deaths: female.deaths,
        },
        cases_percentage: total.cases_percentage,
        deaths_percentage: total.deaths_percentage,
    })
}

/// Parses the eleven age-group rows out of the table page text.
pub fn parse_table(page: &str) -> Result<Vec<RawRow>, ExtractError> {
    let page = UNKNOWN_AGE.replace_all(page, "unknown");
    let start = page.find("0-9").ok_or(ExtractError::MissingTableStart)?;
    // Since late September decimals are printed as `1, 5`.
    let data = page[start..].replace(", ", ",");
    let tokens: Vec<&str> = data.split_whitespace().collect();

    let needed = NUM_ROWS * NUM_COLUMNS;
    if tokens.len() < needed {
        return Err(ExtractError::Truncated {
            expected: needed,
            found: tokens.len(),
        });
    }

    tokens
        .chunks_exact(NUM_COLUMNS)
        .take(NUM_ROWS)
        .zip(AgeGroup::ALL)
        .map(|(row, age_group)| parse_row(row, age_group))
        .collect()
}
