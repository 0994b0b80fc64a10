//! Engine configuration.
//!
//! Every threshold the locator and transformer use lives here rather than in
//! module constants, so tests and callers can vary them per invocation. All
//! structs deserialize from partial JSON with defaults for missing fields.

use serde::{Deserialize, Serialize};

/// Header labels that mark identifier columns (matched case-insensitively).
pub const DEFAULT_IDENTIFIER_PATTERNS: &[&str] = &[
    r"\blocation\b",
    r"\bsite\b",
    r"\bstation\b",
    r"\bdate\b",
    r"\bday\b",
    r"\btime\b",
    r"\bperiod\b",
    r"\bhour\b",
    r"\binterval\b",
    r"\bid\b",
    r"\bdirection\b",
    r"\broad\b",
    r"\bname\b",
];

/// Complete configuration for one `transform_workbook` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub locator: LocatorConfig,
    pub transform: TransformOptions,
    pub save: SaveOptions,
}

/// Where the header block starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderRow {
    /// The first row of the sheet holding any non-empty cell.
    #[default]
    FirstNonEmpty,
    /// A fixed 1-based row number.
    Row(u32),
}

/// Column classification thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocatorConfig {
    /// Regexes matched against header text; a match marks the column as an identifier.
    pub identifier_patterns: Vec<String>,
    /// Largest value still considered a plausible count.
    pub count_ceiling: f64,
    /// Maximum distance from the nearest integer for a "near-integral" value.
    pub integral_tolerance: f64,
    /// Numeric samples a column needs before it can be classified as counts.
    pub min_samples: usize,
    pub header: HeaderRow,
    /// Number of consecutive header rows, starting at `header`.
    pub header_rows: u32,
    /// Only these sheets are considered; `None` means every sheet.
    pub sheets: Option<Vec<String>>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            identifier_patterns: DEFAULT_IDENTIFIER_PATTERNS
                .iter()
                .map(ToString::to_string)
                .collect(),
            count_ceiling: 1_000_000.0,
            integral_tolerance: 1e-6,
            min_samples: 1,
            header: HeaderRow::FirstNonEmpty,
            header_rows: 1,
            sheets: None,
        }
    }
}

/// Per-cell transform adjustments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformOptions {
    /// Leave zero counts untouched and out of the change log.
    pub skip_zero_counts: bool,
    /// When set to `n`, counts in `1..=n` that rounding would leave unchanged
    /// move by one in the operation's direction (never below 1 on decrease).
    pub small_count_nudge: Option<u32>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            skip_zero_counts: true,
            small_count_nudge: None,
        }
    }
}

/// Serializer behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaveOptions {
    /// Set `<calcPr fullCalcOnLoad="1"/>` so totals referencing counts refresh on open.
    pub force_full_calc_on_load: bool,
    /// Re-open the output with the loader before returning it.
    pub verify_round_trip: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            force_full_calc_on_load: true,
            verify_round_trip: true,
        }
    }
}
