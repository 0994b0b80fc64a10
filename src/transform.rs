//! Percentage transform of traffic-count cells.
//!
//! The arithmetic is a pure function of value, operation and percentage. Only
//! cells the locator classified as [`ColumnRole::TrafficCount`] reach it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cell_ref::cell_address;
use crate::config::TransformOptions;
use crate::error::{Result, XlcountError};
use crate::locator::{ColumnRole, SheetClassification, WorkbookClassification};
use crate::types::{ChangeLog, ChangeRecord, MergeMembership, Sheet, Workbook};

/// Direction of the adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Increase,
    Decrease,
}

impl FromStr for Operation {
    type Err = XlcountError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "increase" => Ok(Self::Increase),
            "decrease" => Ok(Self::Decrease),
            _ => Err(XlcountError::InvalidOperation(s.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increase => f.write_str("increase"),
            Self::Decrease => f.write_str("decrease"),
        }
    }
}

/// Whole percentage in `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Percentage(u8);

impl Percentage {
    /// # Errors
    /// `InvalidPercentage` outside `1..=100`.
    pub fn new(value: u32) -> Result<Self> {
        match u8::try_from(value) {
            Ok(p @ 1..=100) => Ok(Self(p)),
            _ => Err(XlcountError::InvalidPercentage(value.to_string())),
        }
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl FromStr for Percentage {
    type Err = XlcountError;

    /// Accepts `"13"` and `"13%"`; fractions and non-numbers are rejected.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
        digits
            .parse::<u32>()
            .map_err(|_| XlcountError::InvalidPercentage(s.to_string()))
            .and_then(|value| {
                Self::new(value).map_err(|_| XlcountError::InvalidPercentage(s.to_string()))
            })
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// A validated operation and percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransformRequest {
    pub operation: Operation,
    pub percentage: Percentage,
}

impl TransformRequest {
    #[must_use]
    pub const fn new(operation: Operation, percentage: Percentage) -> Self {
        Self {
            operation,
            percentage,
        }
    }

    /// Validate raw user input. The percentage is checked first.
    ///
    /// # Errors
    /// `InvalidPercentage` or `InvalidOperation`.
    pub fn parse(percentage: &str, operation: &str) -> Result<Self> {
        let percentage = percentage.parse()?;
        let operation = operation.parse()?;
        Ok(Self::new(operation, percentage))
    }
}

/// New value for a single count.
///
/// `round(n * (100 ± p) / 100)` where `n` is the whole count the cell holds
/// (near-integral values are rounded to it first), rounding half away from
/// zero, floored at zero. Scaling by the whole percentage before dividing
/// keeps halves exact (`50 * 113 / 100 = 56.5 → 57`).
#[must_use]
pub fn transform_count(value: f64, request: &TransformRequest) -> f64 {
    let count = value.round();
    let p = u32::from(request.percentage.get());
    let factor = match request.operation {
        Operation::Increase => 100 + p,
        Operation::Decrease => 100_u32.saturating_sub(p),
    };
    ((count * f64::from(factor)) / 100.0).round().max(0.0)
}

/// Push small counts that rounding left unchanged by one in the operation's
/// direction. Decrease never goes below 1.
fn nudge_small_count(original: f64, new: f64, operation: Operation, limit: u32) -> f64 {
    let moved = (new - original.round()).abs() >= 0.5;
    if moved || original < 1.0 || original > f64::from(limit) {
        return new;
    }
    match operation {
        Operation::Increase => original.round() + 1.0,
        Operation::Decrease => (original.round() - 1.0).max(1.0),
    }
}

/// Apply the request to every traffic-count cell in `plan`.
///
/// Updates are collected per sheet before any value is written, so the
/// classification is never observed half-applied. Every transformed cell is
/// recorded in `log`; only cells whose value changed are marked dirty.
/// Returns the number of change records written.
pub fn apply(
    workbook: &mut Workbook,
    plan: &WorkbookClassification,
    request: &TransformRequest,
    options: &TransformOptions,
    log: &mut ChangeLog,
) -> usize {
    let mut total = 0;

    for classification in &plan.sheets {
        let Some(sheet) = workbook.sheets.get_mut(classification.sheet_index) else {
            continue;
        };
        let updates = plan_sheet(sheet, classification, request, options);
        if updates.is_empty() {
            continue;
        }

        for update in &updates {
            if update.changed {
                sheet.set_number(update.row, update.col, update.new);
            }
            tracing::debug!(
                sheet = %sheet.name,
                cell = %cell_address(update.row, update.col),
                original = update.original,
                new = update.new,
                "transformed count"
            );
            log.record(ChangeRecord {
                sheet: sheet.name.clone(),
                address: cell_address(update.row, update.col),
                original: update.original,
                new: update.new,
                operation: request.operation,
                percentage: request.percentage,
            });
        }

        tracing::info!(sheet = %sheet.name, cells = updates.len(), "sheet transformed");
        log.note(format!("Modified {} cells in {}", updates.len(), sheet.name));
        total += updates.len();
    }

    log.note(format!("Total: {total} cells modified"));
    total
}

struct Update {
    row: u32,
    col: u32,
    original: f64,
    new: f64,
    changed: bool,
}

fn plan_sheet(
    sheet: &Sheet,
    classification: &SheetClassification,
    request: &TransformRequest,
    options: &TransformOptions,
) -> Vec<Update> {
    sheet
        .cells
        .iter()
        .filter(|cd| classification.is_data_row(cd.row))
        .filter(|cd| classification.role(cd.col) == Some(ColumnRole::TrafficCount))
        .filter(|cd| cd.cell.merge != Some(MergeMembership::Covered))
        .filter_map(|cd| cd.cell.value.as_number().map(|v| (cd.row, cd.col, v)))
        .filter(|&(_, _, v)| !(options.skip_zero_counts && v.abs() < 0.5))
        .map(|(row, col, original)| {
            let mut new = transform_count(original, request);
            if let Some(limit) = options.small_count_nudge {
                new = nudge_small_count(original, new, request.operation, limit);
            }
            Update {
                row,
                col,
                original,
                new,
                changed: (new - original).abs() > f64::EPSILON,
            }
        })
        .collect()
}
