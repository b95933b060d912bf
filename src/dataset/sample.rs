use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Length of a landmark vector: 21 hand keypoints × (x, y, z).
pub const FEATURE_COUNT: usize = 63;

/// Letters left out unless explicitly requested. Both are signed with motion,
/// which a single frame of landmarks cannot capture.
pub const DEFAULT_EXCLUDED: [char; 2] = ['J', 'Z'];

/// One captured frame that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Upper-case alphabetic letter.
    pub label: char,
    /// Exactly `FEATURE_COUNT` coordinates.
    pub x: Vec<f64>,
    /// Position of the row in the source JSON array.
    pub index: usize,
}

/// A row as captured by the browser: `{"label": "A", "x": [...], "t": 1732450000000}`.
/// Fields are kept loose here so that one bad row can be dropped instead of failing
/// the whole file; `t` is not needed for training and is ignored.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default)]
    label: Value,
    #[serde(default)]
    x: Value,
}

/// Reason a row was left out of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NotAnObject,
    BadLabel,
    Excluded(char),
    BadFeatures,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rejection::NotAnObject => write!(f, "row is not an object"),
            Rejection::BadLabel => write!(f, "label is not a single letter"),
            Rejection::Excluded(letter) => write!(f, "letter {} is excluded", letter),
            Rejection::BadFeatures => {
                write!(f, "x is not a list of {} numbers", FEATURE_COUNT)
            }
        }
    }
}

/// Reads the captured dataset at `path` and keeps the rows usable for training.
///
/// Rows that are malformed (or carry an excluded letter when `include_jz` is off)
/// are dropped silently; only file-level problems are errors.
pub fn load_samples(path: &Path, include_jz: bool) -> Result<Vec<Sample>> {
    if !path.exists() {
        return Err(Error::DatasetNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)?;
    let raw: Value = serde_json::from_str(&content)?;
    parse_samples(&raw, include_jz)
}

/// Same as `load_samples`, for an already parsed JSON document.
pub fn parse_samples(raw: &Value, include_jz: bool) -> Result<Vec<Sample>> {
    let rows = raw
        .as_array()
        .ok_or_else(|| Error::data("Dataset must be a JSON array of samples"))?;

    let mut samples = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        match parse_row(row, index, include_jz) {
            Ok(sample) => samples.push(sample),
            Err(reason) => tracing::debug!(index, %reason, "dropping row"),
        }
    }

    tracing::info!(
        kept = samples.len(),
        dropped = rows.len() - samples.len(),
        "loaded dataset rows"
    );

    if samples.is_empty() {
        return Err(Error::data("No valid samples found after filtering"));
    }

    Ok(samples)
}

fn parse_row(
    row: &Value,
    index: usize,
    include_jz: bool,
) -> std::result::Result<Sample, Rejection> {
    if !row.is_object() {
        return Err(Rejection::NotAnObject);
    }
    let raw = RawRow::deserialize(row).map_err(|_| Rejection::NotAnObject)?;

    let label = normalize_label(&raw.label).ok_or(Rejection::BadLabel)?;
    if !include_jz && DEFAULT_EXCLUDED.contains(&label) {
        return Err(Rejection::Excluded(label));
    }
    let x = parse_features(&raw.x).ok_or(Rejection::BadFeatures)?;

    Ok(Sample { label, x, index })
}

/// Trimmed, upper-cased label if it is exactly one alphabetic character.
///
/// Numbers are rendered to text first, so they never pass; `null` and other
/// JSON types are rejected outright.
pub fn normalize_label(value: &Value) -> Option<char> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let upper = text.to_uppercase();
    let mut chars = upper.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_alphabetic() => Some(letter),
        _ => None,
    }
}

/// Landmark vector if `value` is an array of exactly `FEATURE_COUNT` numbers
/// (numeric strings are accepted too).
pub fn parse_features(value: &Value) -> Option<Vec<f64>> {
    let items = value.as_array()?;
    if items.len() != FEATURE_COUNT {
        return None;
    }

    items
        .iter()
        .map(|item| match item {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .collect()
}
