use serde::Serialize;

/// Cell with position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellData {
    pub row: u32, // 0-indexed
    pub col: u32, // 0-indexed
    pub cell: Cell,
}

/// A single cell's value, style reference and merge membership.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub value: CellValue,
    /// Index into the workbook's `cellXfs` (the `s` attribute).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_idx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeMembership>,
}

impl Cell {
    #[must_use]
    pub fn new(value: CellValue, style_idx: Option<u32>) -> Self {
        Self {
            value,
            style_idx,
            merge: None,
        }
    }
}

/// What a cell holds, as stored in the package (formulas are never evaluated).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Error literal such as `#DIV/0!`.
    Error(String),
    /// Date/time: a serial number under a date format, or ISO text for `t="d"`.
    Date(String),
    Formula {
        /// Formula text without the leading `=`. Empty for shared-formula followers.
        text: String,
        /// The cached `<v>` text, if the producer stored one.
        cached: Option<String>,
        /// Part of a shared formula group (`<f t="shared">`).
        shared: bool,
    },
}

impl CellValue {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Position of a cell within a merged range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeMembership {
    /// Top-left cell; carries the merged value.
    Anchor,
    /// Any other cell of the range; hidden behind the anchor.
    Covered,
}
