//! Historical offers table
//!
//! Semicolon-delimited with comma decimals, or comma-delimited with dot
//! decimals when the header has no semicolon. One header row. Columns are found
//! by name (English or the portal's German names); extra columns are
//! ignored. Rows that cannot be parsed are dropped with a warning.

use crate::error::{EstimatorError, Result};
use crate::models::{FeatureRow, LabeledOffer};
use crate::schema::{energy_class_from_letter, FEATURE_COUNT, FEATURE_NAMES};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Column aliases per logical column
const PRICE: &[&str] = &["price", "kaufpreis"];
const LISTED_DATE: &[&str] = &["listed_date", "adat"];
const DUPLICATE_OF: &[&str] = &["duplicate_of", "duplicateid"];
const FEATURE_COLUMNS: [&[&str]; FEATURE_COUNT] = [
    &["living_area", "living_area_m2", "wohnflaeche"],
    &["room_count", "zimmeranzahl"],
    &["bedroom_count", "schlafzimmer"],
    &["bathroom_count", "badezimmer"],
    &["elevator", "has_elevator", "aufzug"],
    &["balcony", "has_balcony", "balkon"],
    &["heritage", "is_heritage_listed", "denkmalobjekt"],
    &["parking", "has_parking", "parkplatz"],
    &["energy_class", "energieeffizienzklasse"],
];

/// Codes the portal uses for "not specified", per feature column
const SENTINELS: [&[f64]; FEATURE_COUNT] = [
    &[],
    &[-5.0, 0.0],
    &[-5.0, -9.0],
    &[-9.0],
    &[],
    &[],
    &[],
    &[-9.0],
    &[-7.0],
];
const DUPLICATE_SENTINEL: i64 = -9;

/// Result of reading an offers table
#[derive(Debug, Clone)]
pub struct ParsedOffers {
    pub offers: Vec<LabeledOffer>,
    pub rows_read: usize,
    pub dropped_malformed: usize,
}

/// Read and parse an offers file
pub fn load_offers(path: &Path) -> Result<ParsedOffers> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EstimatorError::NotFound(format!("offers file {}", path.display()))
        } else {
            EstimatorError::Io(e)
        }
    })?;
    let parsed = parse_offers(&text)?;
    info!(
        path = %path.display(),
        rows_read = parsed.rows_read,
        offers = parsed.offers.len(),
        dropped_malformed = parsed.dropped_malformed,
        "Loaded offers table"
    );
    Ok(parsed)
}

struct Columns {
    delimiter: char,
    price: usize,
    listed_date: usize,
    duplicate_of: Option<usize>,
    features: [usize; FEATURE_COUNT],
}

impl Columns {
    fn from_header(header: &str) -> Result<Self> {
        let delimiter = if header.contains(';') { ';' } else { ',' };
        let names: Vec<String> = split_fields(header, delimiter)
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        let find = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));

        let mut missing = Vec::new();
        let price = find(PRICE);
        if price.is_none() {
            missing.push(PRICE[0]);
        }
        let listed_date = find(LISTED_DATE);
        if listed_date.is_none() {
            missing.push(LISTED_DATE[0]);
        }
        let mut features = [0usize; FEATURE_COUNT];
        for (slot, aliases) in features.iter_mut().zip(FEATURE_COLUMNS.iter()) {
            match find(aliases) {
                Some(idx) => *slot = idx,
                None => missing.push(aliases[0]),
            }
        }

        match (price, listed_date) {
            (Some(price), Some(listed_date)) if missing.is_empty() => Ok(Self {
                delimiter,
                price,
                listed_date,
                duplicate_of: find(DUPLICATE_OF),
                features,
            }),
            _ => Err(EstimatorError::Validation(format!(
                "offers table is missing column(s): {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Parse offers from table text
pub fn parse_offers(text: &str) -> Result<ParsedOffers> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines
        .next()
        .ok_or_else(|| EstimatorError::InsufficientData("offers table is empty".to_string()))?;
    let columns = Columns::from_header(header.trim_start_matches('\u{feff}'))?;

    let mut offers = Vec::new();
    let mut rows_read = 0;
    let mut dropped_malformed = 0;
    for (idx, line) in lines {
        rows_read += 1;
        match parse_row(&columns, line) {
            Ok(offer) => offers.push(offer),
            Err(reason) => {
                dropped_malformed += 1;
                warn!(line = idx + 1, reason = %reason, "Dropping malformed offer row");
            }
        }
    }

    debug!(rows_read, dropped_malformed, "Parsed offers table");
    Ok(ParsedOffers {
        offers,
        rows_read,
        dropped_malformed,
    })
}

fn parse_row(columns: &Columns, line: &str) -> std::result::Result<LabeledOffer, String> {
    let fields = split_fields(line, columns.delimiter);
    let field = |idx: usize| fields.get(idx).map(String::as_str).unwrap_or("");

    let price = parse_number(field(columns.price))
        .map_err(|e| format!("price: {}", e))?
        .filter(|p| *p > 0.0)
        .ok_or_else(|| "price missing or not positive".to_string())?;

    let listed_date = parse_month(field(columns.listed_date))
        .ok_or_else(|| format!("unparseable listed date '{}'", field(columns.listed_date)))?;

    let duplicate_of = match columns.duplicate_of {
        Some(idx) => parse_number(field(idx))
            .map_err(|e| format!("duplicate_of: {}", e))?
            .map(|v| v as i64)
            .filter(|v| *v != DUPLICATE_SENTINEL),
        None => None,
    };

    let mut features: FeatureRow = [None; FEATURE_COUNT];
    for (i, slot) in features.iter_mut().enumerate() {
        let raw = field(columns.features[i]);
        let value = if i == 8 {
            parse_energy_class(raw)
        } else if (4..8).contains(&i) {
            parse_flag(raw)
        } else {
            parse_number(raw)
        }
        .map_err(|e| format!("{}: {}", FEATURE_NAMES[i], e))?;
        *slot = value.filter(|v| !SENTINELS[i].contains(v));
    }

    Ok(LabeledOffer {
        features,
        price,
        listed_date,
        duplicate_of,
    })
}

fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .map(|f| f.trim().trim_matches('"').trim().to_string())
        .collect()
}

fn is_missing(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan")
}

/// German-locale number: `.` groups thousands when a `,` decimal is present
pub fn parse_number(raw: &str) -> std::result::Result<Option<f64>, String> {
    if is_missing(raw) {
        return Ok(None);
    }
    let normalized = if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else {
        raw.to_string()
    };
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        Ok(_) => Err(format!("'{}' is not a finite number", raw)),
        Err(_) => Err(format!("'{}' is not a number", raw)),
    }
}

fn parse_flag(raw: &str) -> std::result::Result<Option<f64>, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "ja" => Ok(Some(1.0)),
        "false" | "no" | "nein" => Ok(Some(0.0)),
        _ => parse_number(raw),
    }
}

fn parse_energy_class(raw: &str) -> std::result::Result<Option<f64>, String> {
    if let Some(class) = energy_class_from_letter(raw.trim_end_matches('+')) {
        return Ok(Some(f64::from(class)));
    }
    parse_number(raw)
}

/// `YYYYmMM` (e.g. `2007m11`) to the first day of that month
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    let (year, month) = raw.trim().split_once('m')?;
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

/// Per-column statistics for an offers table
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub present: usize,
    pub missing: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnSummary {
    fn from_values(column: &str, values: impl Iterator<Item = Option<f64>>) -> Self {
        let mut present = 0;
        let mut missing = 0;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values {
            match value {
                Some(v) => {
                    present += 1;
                    sum += v;
                    min = min.min(v);
                    max = max.max(v);
                }
                None => missing += 1,
            }
        }
        let any = present > 0;
        Self {
            column: column.to_string(),
            present,
            missing,
            mean: any.then(|| sum / present as f64),
            min: any.then_some(min),
            max: any.then_some(max),
        }
    }
}

/// Overview of an offers table, used to review data before training
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub offers: usize,
    pub duplicates: usize,
    pub dropped_malformed: usize,
    pub first_listed: Option<NaiveDate>,
    pub last_listed: Option<NaiveDate>,
    pub columns: Vec<ColumnSummary>,
}

impl DatasetSummary {
    pub fn from_parsed(parsed: &ParsedOffers) -> Self {
        let offers = &parsed.offers;
        let mut columns = vec![ColumnSummary::from_values(
            "price",
            offers.iter().map(|o| Some(o.price)),
        )];
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            columns.push(ColumnSummary::from_values(
                name,
                offers.iter().map(|o| o.features[i]),
            ));
        }
        Self {
            offers: offers.len(),
            duplicates: offers.iter().filter(|o| o.duplicate_of.is_some()).count(),
            dropped_malformed: parsed.dropped_malformed,
            first_listed: offers.iter().map(|o| o.listed_date).min(),
            last_listed: offers.iter().map(|o| o.listed_date).max(),
            columns,
        }
    }
}
