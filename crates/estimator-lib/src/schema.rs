//! Feature schema and input validation
//!
//! Defines the 9-dimensional input contract shared by training and
//! inference. Raw input arrives either positionally (a list of 9 values in
//! schema order) or by name; both are coerced into [`ApartmentFeatures`].

use crate::error::{EstimatorError, Result};
use crate::models::ApartmentFeatures;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of model input features
pub const FEATURE_COUNT: usize = 9;

/// Feature names in model column order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "living_area_m2",
    "room_count",
    "bedroom_count",
    "bathroom_count",
    "has_elevator",
    "has_balcony",
    "is_heritage_listed",
    "has_parking",
    "energy_class",
];

pub const MIN_ROOMS: f64 = 1.0;
pub const MAX_ROOMS: f64 = 8.0;
pub const MIN_BEDROOMS: u8 = 1;
pub const MAX_BEDROOMS: u8 = 5;
pub const MIN_BATHROOMS: u8 = 1;
pub const MAX_BATHROOMS: u8 = 3;
pub const BEST_ENERGY_CLASS: u8 = 1;
pub const WORST_ENERGY_CLASS: u8 = 8;

/// Energy label letters, index + 1 is the ordinal class
const ENERGY_LETTERS: [char; 8] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

/// Schema feature names as owned strings, for artifacts and error reports
pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Check that a feature layout matches the schema by name and position
pub fn ensure_layout(found: &[String]) -> Result<()> {
    let matches = found.len() == FEATURE_COUNT
        && found.iter().zip(FEATURE_NAMES.iter()).all(|(a, b)| a == b);
    if matches {
        Ok(())
    } else {
        Err(EstimatorError::SchemaMismatch {
            expected: feature_names(),
            found: found.to_vec(),
        })
    }
}

/// Map an energy label `A`..`H` to its ordinal class 1..8
pub fn energy_class_from_letter(letter: &str) -> Option<u8> {
    let mut chars = letter.trim().chars();
    let c = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() {
        return None;
    }
    ENERGY_LETTERS
        .iter()
        .position(|&l| l == c)
        .map(|idx| idx as u8 + 1)
}

/// Map an ordinal class 1..8 back to its label
pub fn energy_class_letter(class: u8) -> Option<char> {
    ENERGY_LETTERS.get(usize::from(class).checked_sub(1)?).copied()
}

/// A single unvalidated input value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Flag(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

/// Unvalidated feature input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawFeatures {
    /// Values in schema order
    Positional(Vec<RawValue>),
    /// Values keyed by feature name
    Named(BTreeMap<String, RawValue>),
}

impl RawFeatures {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<RawValue>,
    {
        RawFeatures::Positional(values.into_iter().map(Into::into).collect())
    }
}

/// Validate raw input and produce typed features
pub fn validate(raw: &RawFeatures) -> Result<ApartmentFeatures> {
    let values = ordered_values(raw)?;

    let living_area_m2 = number(&values[0], FEATURE_NAMES[0])?;
    if !(living_area_m2 > 0.0) {
        return Err(invalid(FEATURE_NAMES[0], "must be a positive number"));
    }

    let room_count = number(&values[1], FEATURE_NAMES[1])?;
    if !(MIN_ROOMS..=MAX_ROOMS).contains(&room_count) || (room_count * 2.0).fract() != 0.0 {
        return Err(invalid(
            FEATURE_NAMES[1],
            "must be between 1 and 8 in steps of 0.5",
        ));
    }

    let bedroom_count = bounded_integer(&values[2], FEATURE_NAMES[2], MIN_BEDROOMS, MAX_BEDROOMS)?;
    let bathroom_count =
        bounded_integer(&values[3], FEATURE_NAMES[3], MIN_BATHROOMS, MAX_BATHROOMS)?;
    let has_elevator = flag(&values[4], FEATURE_NAMES[4])?;
    let has_balcony = flag(&values[5], FEATURE_NAMES[5])?;
    let is_heritage_listed = flag(&values[6], FEATURE_NAMES[6])?;
    let has_parking = flag(&values[7], FEATURE_NAMES[7])?;
    let energy_class = energy_class(&values[8])?;

    Ok(ApartmentFeatures {
        living_area_m2,
        room_count,
        bedroom_count,
        bathroom_count,
        has_elevator,
        has_balcony,
        is_heritage_listed,
        has_parking,
        energy_class,
    })
}

/// Re-check already typed features against the domain rules
pub fn validate_features(features: &ApartmentFeatures) -> Result<ApartmentFeatures> {
    let raw = RawFeatures::positional(features.to_vector());
    validate(&raw)
}

fn ordered_values(raw: &RawFeatures) -> Result<Vec<RawValue>> {
    match raw {
        RawFeatures::Positional(values) => {
            if values.len() != FEATURE_COUNT {
                return Err(EstimatorError::Validation(format!(
                    "expected {} feature values, got {}",
                    FEATURE_COUNT,
                    values.len()
                )));
            }
            Ok(values.clone())
        }
        RawFeatures::Named(map) => {
            if let Some(unknown) = map.keys().find(|k| !FEATURE_NAMES.contains(&k.as_str())) {
                return Err(EstimatorError::Validation(format!(
                    "unknown feature '{}'",
                    unknown
                )));
            }
            FEATURE_NAMES
                .iter()
                .map(|name| {
                    map.get(*name).cloned().ok_or_else(|| {
                        EstimatorError::Validation(format!("missing feature '{}'", name))
                    })
                })
                .collect()
        }
    }
}

fn invalid(field: &str, reason: &str) -> EstimatorError {
    EstimatorError::Validation(format!("{} {}", field, reason))
}

fn number(value: &RawValue, field: &str) -> Result<f64> {
    let n = match value {
        RawValue::Number(n) => *n,
        RawValue::Flag(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        RawValue::Text(s) => s
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .map_err(|_| invalid(field, "is not numeric"))?,
    };
    if n.is_finite() {
        Ok(n)
    } else {
        Err(invalid(field, "must be finite"))
    }
}

fn bounded_integer(value: &RawValue, field: &str, min: u8, max: u8) -> Result<u8> {
    let n = number(value, field)?;
    if n.fract() != 0.0 || n < f64::from(min) || n > f64::from(max) {
        return Err(EstimatorError::Validation(format!(
            "{} must be a whole number between {} and {}",
            field, min, max
        )));
    }
    Ok(n as u8)
}

fn flag(value: &RawValue, field: &str) -> Result<bool> {
    match value {
        RawValue::Flag(b) => Ok(*b),
        RawValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(invalid(field, "must be a boolean")),
        },
        RawValue::Number(n) if *n == 0.0 => Ok(false),
        RawValue::Number(n) if *n == 1.0 => Ok(true),
        RawValue::Number(_) => Err(invalid(field, "must be 0 or 1")),
    }
}

fn energy_class(value: &RawValue) -> Result<u8> {
    if let RawValue::Text(s) = value {
        if let Some(class) = energy_class_from_letter(s) {
            return Ok(class);
        }
    }
    bounded_integer(value, FEATURE_NAMES[8], BEST_ENERGY_CLASS, WORST_ENERGY_CLASS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawFeatures {
        RawFeatures::positional([75.0, 3.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0])
    }

    #[test]
    fn test_valid_positional_vector() {
        let f = validate(&sample()).unwrap();
        assert_eq!(f.living_area_m2, 75.0);
        assert_eq!(f.room_count, 3.0);
        assert!(f.has_parking);
        assert!(!f.has_elevator);
        assert_eq!(f.energy_class, 4);
        assert_eq!(f.to_vector(), [75.0, 3.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0]);
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        let raw = RawFeatures::positional([75.0, 3.0, 1.0]);
        let err = validate(&raw).unwrap_err();
        assert!(matches!(err, EstimatorError::Validation(_)));
    }

    #[test]
    fn test_half_rooms_only_for_room_count() {
        let ok = RawFeatures::positional([50.0, 2.5, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0]);
        assert_eq!(validate(&ok).unwrap().room_count, 2.5);

        let bad_bedrooms = RawFeatures::positional([50.0, 2.0, 1.5, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0]);
        assert!(validate(&bad_bedrooms).is_err());

        let bad_rooms = RawFeatures::positional([50.0, 2.25, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0]);
        assert!(validate(&bad_rooms).is_err());
    }

    #[test]
    fn test_domain_bounds() {
        let cases = [
            [0.0, 3.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0],
            [75.0, 8.5, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0],
            [75.0, 3.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0],
            [75.0, 3.0, 1.0, 4.0, 0.0, 0.0, 0.0, 1.0, 4.0],
            [75.0, 3.0, 1.0, 1.0, 2.0, 0.0, 0.0, 1.0, 4.0],
            [75.0, 3.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 9.0],
            [75.0, 3.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        ];
        for case in cases {
            assert!(
                validate(&RawFeatures::positional(case)).is_err(),
                "{:?} should be rejected",
                case
            );
        }
    }

    #[test]
    fn test_booleans_and_letters_coerced() {
        let raw = RawFeatures::Positional(vec![
            RawValue::Number(100.0),
            RawValue::Text("4".into()),
            RawValue::Number(2.0),
            RawValue::Number(1.0),
            RawValue::Flag(true),
            RawValue::Text("no".into()),
            RawValue::Flag(false),
            RawValue::Number(1.0),
            RawValue::Text("d".into()),
        ]);
        let f = validate(&raw).unwrap();
        assert!(f.has_elevator);
        assert!(!f.has_balcony);
        assert_eq!(f.room_count, 4.0);
        assert_eq!(f.energy_class, 4);
    }

    #[test]
    fn test_named_input_is_reordered() {
        let mut map = BTreeMap::new();
        for (name, value) in FEATURE_NAMES
            .iter()
            .zip([75.0, 3.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0])
        {
            map.insert(name.to_string(), RawValue::Number(value));
        }
        let named = validate(&RawFeatures::Named(map)).unwrap();
        assert_eq!(named, validate(&sample()).unwrap());
    }

    #[test]
    fn test_named_input_rejects_unknown_and_missing() {
        let mut map = BTreeMap::new();
        map.insert("living_area_m2".to_string(), RawValue::Number(75.0));
        let err = validate(&RawFeatures::Named(map.clone())).unwrap_err();
        assert!(err.to_string().contains("missing feature"));

        map.insert("garden".to_string(), RawValue::Flag(true));
        let err = validate(&RawFeatures::Named(map)).unwrap_err();
        assert!(err.to_string().contains("unknown feature 'garden'"));
    }

    #[test]
    fn test_raw_features_deserialize_both_shapes() {
        let positional: RawFeatures =
            serde_json::from_str("[75, 3, 1, 1, false, false, false, true, \"D\"]").unwrap();
        assert_eq!(validate(&positional).unwrap().energy_class, 4);

        let named: RawFeatures = serde_json::from_str(
            r#"{"living_area_m2":75,"room_count":3,"bedroom_count":1,"bathroom_count":1,
                "has_elevator":0,"has_balcony":0,"is_heritage_listed":0,"has_parking":1,
                "energy_class":4}"#,
        )
        .unwrap();
        assert_eq!(validate(&named).unwrap(), validate(&positional).unwrap());
    }

    #[test]
    fn test_energy_letters() {
        assert_eq!(energy_class_from_letter("A"), Some(1));
        assert_eq!(energy_class_from_letter("h"), Some(8));
        assert_eq!(energy_class_from_letter("I"), None);
        assert_eq!(energy_class_from_letter("AB"), None);
        assert_eq!(energy_class_letter(4), Some('D'));
        assert_eq!(energy_class_letter(0), None);
    }

    #[test]
    fn test_layout_check() {
        assert!(ensure_layout(&feature_names()).is_ok());
        let mut swapped = feature_names();
        swapped.swap(0, 1);
        assert!(matches!(
            ensure_layout(&swapped),
            Err(EstimatorError::SchemaMismatch { .. })
        ));
    }
}
