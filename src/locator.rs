//! Traffic-count locator.
//!
//! Assigns a [`ColumnRole`] to every column of every sheet before any cell is
//! touched. The result depends only on the workbook and [`LocatorConfig`],
//! never on the transform direction or percentage.
//!
//! Per sheet:
//! 1. The header block is the first non-empty row (or a configured row) plus
//!    `header_rows - 1` rows below it. Header cells are inspected, never changed.
//! 2. A header matching an identifier pattern makes the column `Identifier`.
//! 3. Otherwise the data cells below the header decide, see [`classify_samples`].

use regex::{RegexSet, RegexSetBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::cell_ref::col_to_letter;
use crate::config::{HeaderRow, LocatorConfig};
use crate::error::{Result, XlcountError};
use crate::types::{CellValue, MergeMembership, Sheet, Workbook};

/// Semantic purpose of a column, computed once per column per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ColumnRole {
    /// Labels: location names, dates, times, ids.
    Identifier,
    /// Whole non-negative numbers below the ceiling. The only role that is transformed.
    TrafficCount,
    /// Numbers that are not counts (fractions, negatives, huge values, dates).
    OtherNumeric,
    /// Data cells are all formulas.
    Formula,
    /// Could not decide; left untouched and reported as skipped.
    Unknown { reason: UnknownReason },
}

/// Why a column could not be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnknownReason {
    TooFewSamples { found: usize, required: usize },
    MixedTypes,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier => f.write_str("identifier"),
            Self::TrafficCount => f.write_str("traffic-count"),
            Self::OtherNumeric => f.write_str("other-numeric"),
            Self::Formula => f.write_str("formula"),
            Self::Unknown {
                reason: UnknownReason::TooFewSamples { found, required },
            } => write!(f, "unknown (too few samples: {found} of {required})"),
            Self::Unknown {
                reason: UnknownReason::MixedTypes,
            } => f.write_str("unknown (mixed value types)"),
        }
    }
}

/// Tally of the data cells below the header block of one column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSamples {
    pub numbers: usize,
    pub texts: usize,
    pub dates: usize,
    pub formulas: usize,
}

/// Classification of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnClassification {
    /// 0-indexed column.
    pub column: u32,
    /// Column letters, e.g. `"B"`.
    pub letter: String,
    /// Header text found for the column (joined across header rows).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    pub role: ColumnRole,
    pub samples: ColumnSamples,
}

/// Classification of one sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetClassification {
    /// Index into `Workbook::sheets`.
    pub sheet_index: usize,
    pub sheet_name: String,
    /// 0-indexed inclusive row span of the header block; `None` for an empty sheet.
    pub header_rows: Option<(u32, u32)>,
    pub columns: BTreeMap<u32, ColumnClassification>,
    /// Non-formula numeric data cells in traffic-count columns.
    pub count_cells: usize,
}

impl SheetClassification {
    #[must_use]
    pub fn role(&self, column: u32) -> Option<ColumnRole> {
        self.columns.get(&column).map(|c| c.role)
    }

    /// Whether `row` lies in the data area (below the header block).
    #[must_use]
    pub fn is_data_row(&self, row: u32) -> bool {
        self.header_rows.is_some_and(|(_, last)| row > last)
    }

    /// Columns the transformer will skip because they could not be classified.
    pub fn skipped(&self) -> impl Iterator<Item = &ColumnClassification> {
        self.columns
            .values()
            .filter(|c| matches!(c.role, ColumnRole::Unknown { .. }))
    }
}

/// Classification of every considered sheet, in workbook order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookClassification {
    pub sheets: Vec<SheetClassification>,
    /// Names from the `sheets` allow list that match no sheet in the workbook.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_sheets: Vec<String>,
}

impl WorkbookClassification {
    /// Cells classified as traffic counts across the whole workbook.
    #[must_use]
    pub fn count_cells(&self) -> usize {
        self.sheets.iter().map(|s| s.count_cells).sum()
    }
}

/// A [`LocatorConfig`] with its identifier patterns compiled.
#[derive(Debug, Clone)]
pub struct Locator {
    config: LocatorConfig,
    identifiers: RegexSet,
}

impl Locator {
    /// Compile the configuration.
    ///
    /// # Errors
    /// `InvalidConfig` for a bad identifier regex or a non-positive header span.
    pub fn new(config: &LocatorConfig) -> Result<Self> {
        if config.header_rows == 0 {
            return Err(XlcountError::InvalidConfig(
                "header_rows must be at least 1".into(),
            ));
        }
        if let HeaderRow::Row(0) = config.header {
            return Err(XlcountError::InvalidConfig(
                "header row numbers are 1-based".into(),
            ));
        }
        if !(config.count_ceiling >= 0.0 && config.integral_tolerance >= 0.0) {
            return Err(XlcountError::InvalidConfig(
                "count_ceiling and integral_tolerance must be non-negative".into(),
            ));
        }
        let identifiers = RegexSetBuilder::new(&config.identifier_patterns)
            .case_insensitive(true)
            .build()
            .map_err(|e| XlcountError::InvalidConfig(format!("identifier pattern: {e}")))?;

        Ok(Self {
            config: config.clone(),
            identifiers,
        })
    }

    /// Classify every sheet allowed by the `sheets` filter.
    #[must_use]
    pub fn classify_workbook(&self, workbook: &Workbook) -> WorkbookClassification {
        let sheets = workbook
            .sheets
            .iter()
            .enumerate()
            .filter(|(_, sheet)| self.includes_sheet(&sheet.name))
            .map(|(idx, sheet)| self.classify_sheet(idx, sheet))
            .collect();

        let missing_sheets: Vec<String> = self
            .config
            .sheets
            .iter()
            .flatten()
            .filter(|name| workbook.sheet(name).is_none())
            .cloned()
            .collect();
        for name in &missing_sheets {
            tracing::warn!(sheet = %name, "requested sheet not found in workbook");
        }

        WorkbookClassification {
            sheets,
            missing_sheets,
        }
    }

    fn includes_sheet(&self, name: &str) -> bool {
        self.config
            .sheets
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|s| s == name))
    }

    /// Classify the columns of one sheet.
    #[must_use]
    pub fn classify_sheet(&self, sheet_index: usize, sheet: &Sheet) -> SheetClassification {
        let mut classification = SheetClassification {
            sheet_index,
            sheet_name: sheet.name.clone(),
            header_rows: self.header_span(sheet),
            columns: BTreeMap::new(),
            count_cells: 0,
        };
        let Some((first, last)) = classification.header_rows else {
            return classification;
        };

        let headers = header_texts(sheet, first, last);
        let mut samples: BTreeMap<u32, ColumnSamples> = BTreeMap::new();
        let mut count_candidates: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        let columns: BTreeSet<u32> = sheet.cells.iter().map(|cd| cd.col).collect();

        for cd in &sheet.cells {
            if cd.row <= last || cd.cell.merge == Some(MergeMembership::Covered) {
                continue;
            }
            let tally = samples.entry(cd.col).or_default();
            match &cd.cell.value {
                CellValue::Empty => {}
                CellValue::Text(s) if s.trim().is_empty() => {}
                CellValue::Number(n) => {
                    tally.numbers += 1;
                    count_candidates.entry(cd.col).or_default().push(*n);
                }
                CellValue::Text(_) | CellValue::Boolean(_) | CellValue::Error(_) => {
                    tally.texts += 1;
                }
                CellValue::Date(_) => tally.dates += 1,
                CellValue::Formula { .. } => tally.formulas += 1,
            }
        }

        for col in columns {
            let header = headers.get(&col).cloned();
            let column_samples = samples.get(&col).copied().unwrap_or_default();
            let role = if header.as_deref().is_some_and(|h| self.identifiers.is_match(h)) {
                ColumnRole::Identifier
            } else {
                let values = count_candidates.get(&col).map_or(&[][..], Vec::as_slice);
                classify_samples(&self.config, &column_samples, values)
            };

            if role == ColumnRole::TrafficCount {
                classification.count_cells += column_samples.numbers;
            }
            tracing::debug!(
                sheet = %sheet.name,
                column = %col_to_letter(col),
                header = header.as_deref().unwrap_or(""),
                %role,
                "classified column"
            );
            classification.columns.insert(
                col,
                ColumnClassification {
                    column: col,
                    letter: col_to_letter(col),
                    header,
                    role,
                    samples: column_samples,
                },
            );
        }

        classification
    }

    fn header_span(&self, sheet: &Sheet) -> Option<(u32, u32)> {
        let first = match self.config.header {
            HeaderRow::Row(n) => n.saturating_sub(1),
            HeaderRow::FirstNonEmpty => sheet
                .cells
                .iter()
                .filter(|cd| !cd.cell.value.is_empty())
                .map(|cd| cd.row)
                .min()?,
        };
        Some((first, first.saturating_add(self.config.header_rows - 1)))
    }
}

/// Decide a column's role from its data cells.
///
/// - only formulas → `Formula`; nothing at all → `Unknown(TooFewSamples)`
/// - only text → `Identifier`; only dates → `OtherNumeric`
/// - text or dates mixed with anything else → `Unknown(MixedTypes)`
/// - fewer numbers than `min_samples` → `Unknown(TooFewSamples)`
/// - every number near-integral and within `0..=count_ceiling` → `TrafficCount`
/// - otherwise `OtherNumeric`
///
/// Formula cells may sit among counts (row totals); they never block the
/// classification and are never transformed.
#[must_use]
pub fn classify_samples(
    config: &LocatorConfig,
    samples: &ColumnSamples,
    values: &[f64],
) -> ColumnRole {
    let ColumnSamples {
        numbers,
        texts,
        dates,
        formulas,
    } = *samples;

    if numbers + texts + dates == 0 {
        return if formulas > 0 {
            ColumnRole::Formula
        } else {
            ColumnRole::Unknown {
                reason: UnknownReason::TooFewSamples {
                    found: 0,
                    required: config.min_samples.max(1),
                },
            }
        };
    }
    if numbers == 0 && dates == 0 {
        return ColumnRole::Identifier;
    }
    if numbers == 0 && texts == 0 {
        return ColumnRole::OtherNumeric;
    }
    if texts > 0 || dates > 0 {
        return ColumnRole::Unknown {
            reason: UnknownReason::MixedTypes,
        };
    }
    if numbers < config.min_samples {
        return ColumnRole::Unknown {
            reason: UnknownReason::TooFewSamples {
                found: numbers,
                required: config.min_samples,
            },
        };
    }

    let plausible = values.iter().all(|&v| {
        v.is_finite()
            && v >= 0.0
            && v <= config.count_ceiling
            && (v - v.round()).abs() <= config.integral_tolerance
    });
    if plausible {
        ColumnRole::TrafficCount
    } else {
        ColumnRole::OtherNumeric
    }
}

/// Header text per column across the header block.
///
/// Text of a merged header cell applies to every column the merge spans.
fn header_texts(sheet: &Sheet, first: u32, last: u32) -> BTreeMap<u32, String> {
    let mut headers: BTreeMap<u32, Vec<String>> = BTreeMap::new();

    for cd in &sheet.cells {
        if cd.row < first || cd.row > last {
            continue;
        }
        let text = match &cd.cell.value {
            CellValue::Text(s) if !s.trim().is_empty() => s.trim().to_string(),
            CellValue::Formula {
                cached: Some(cached),
                ..
            } if cached.parse::<f64>().is_err() && !cached.trim().is_empty() => {
                cached.trim().to_string()
            }
            _ => continue,
        };

        let span = sheet
            .merges
            .iter()
            .find(|m| m.start_row == cd.row && m.start_col == cd.col)
            .map_or((cd.col, cd.col), |m| (m.start_col, m.end_col));
        for col in span.0..=span.1 {
            headers.entry(col).or_default().push(text.clone());
        }
    }

    headers
        .into_iter()
        .map(|(col, parts)| (col, parts.join(" ")))
        .collect()
}
