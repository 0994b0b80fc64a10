use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::{Cell, CellData, CellValue, MergeMembership};
use crate::numfmt::{is_builtin_date_format, is_date_format};

/// A loaded XLSX workbook.
///
/// Keeps the original package bytes alongside the parsed structure: the
/// serializer copies every part it does not have to rewrite straight from
/// `source`, which is how styles, drawings, themes and anything else this
/// crate does not model survive untouched.
#[derive(Debug, Clone)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
    pub styles: StyleTable,
    /// Named ranges and defined names from the workbook
    pub defined_names: Vec<DefinedName>,
    /// Whether the workbook uses the 1904 date system
    pub date1904: bool,
    /// The original XLSX package.
    pub(crate) source: Vec<u8>,
}

impl Workbook {
    /// Find a sheet by name.
    #[must_use]
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Sheets with at least one changed cell.
    pub fn dirty_sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter().filter(|s| s.is_dirty())
    }

    /// Whether any cell has been changed since loading.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.sheets.iter().any(Sheet::is_dirty)
    }

    /// The package bytes the workbook was loaded from.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }
}

/// A defined name (named range) in the workbook
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefinedName {
    pub name: String,
    /// The formula/reference value (e.g., "Sheet1!$A$1:$D$10")
    pub value: String,
    /// If present, the name is scoped to this sheet (0-indexed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_sheet_id: Option<u32>,
}

/// The part of `xl/styles.xml` the locator cares about.
///
/// Cells reference entries of `cell_xfs` by index; the table is shared by
/// every sheet and never modified.
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    /// `numFmtId` of each `<cellXfs>/<xf>`, in order.
    pub cell_xfs: Vec<u32>,
    /// Custom number formats from `<numFmts>` keyed by id.
    pub num_fmts: HashMap<u32, String>,
}

impl StyleTable {
    /// Number format id used by a cell style (`s` attribute); missing means xf 0.
    #[must_use]
    pub fn num_fmt_id(&self, style_idx: Option<u32>) -> u32 {
        let idx = usize::try_from(style_idx.unwrap_or(0)).unwrap_or(usize::MAX);
        self.cell_xfs.get(idx).copied().unwrap_or(0)
    }

    /// Whether a cell style renders numbers as dates or times.
    #[must_use]
    pub fn is_date_style(&self, style_idx: Option<u32>) -> bool {
        let id = self.num_fmt_id(style_idx);
        match self.num_fmts.get(&id) {
            Some(code) => is_date_format(code),
            None => is_builtin_date_format(id),
        }
    }
}

/// Sheet visibility state
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SheetState {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

/// A single worksheet
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    /// ZIP entry of the worksheet part (e.g. `xl/worksheets/sheet1.xml`).
    pub path: String,
    pub state: SheetState,
    /// Sparse representation in document (row-major) order.
    pub cells: Vec<CellData>,
    pub merges: Vec<MergeRange>,
    pub col_widths: Vec<ColWidth>,
    pub row_heights: Vec<RowHeight>,
    pub default_col_width: Option<f64>,
    pub default_row_height: Option<f64>,
    /// Position index into `cells`.
    cell_index: HashMap<(u32, u32), usize>,
    /// Cells whose value was changed by the transform pass.
    dirty: BTreeSet<(u32, u32)>,
}

impl Sheet {
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            state: SheetState::Visible,
            cells: Vec::new(),
            merges: Vec::new(),
            col_widths: Vec::new(),
            row_heights: Vec::new(),
            default_col_width: None,
            default_row_height: None,
            cell_index: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Append a cell and index it. A later cell at the same position wins.
    pub fn push_cell(&mut self, row: u32, col: u32, cell: Cell) {
        self.cell_index.insert((row, col), self.cells.len());
        self.cells.push(CellData { row, col, cell });
    }

    #[must_use]
    pub fn cell_at(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cell_index
            .get(&(row, col))
            .and_then(|&idx| self.cells.get(idx))
            .map(|cd| &cd.cell)
    }

    #[must_use]
    pub fn value_at(&self, row: u32, col: u32) -> &CellValue {
        self.cell_at(row, col)
            .map_or(&CellValue::Empty, |cell| &cell.value)
    }

    /// Replace a numeric value and mark the cell dirty.
    ///
    /// Returns `false` (and changes nothing) if there is no cell at the position.
    pub fn set_number(&mut self, row: u32, col: u32, value: f64) -> bool {
        let Some(cd) = self
            .cell_index
            .get(&(row, col))
            .and_then(|&idx| self.cells.get_mut(idx))
        else {
            return false;
        };
        cd.cell.value = CellValue::Number(value);
        self.dirty.insert((row, col));
        true
    }

    /// Positions changed since loading, in row-major order.
    pub fn dirty_cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.dirty.iter().copied()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Mark merge anchors and covered cells from `merges`.
    pub(crate) fn apply_merge_membership(&mut self) {
        for cd in &mut self.cells {
            cd.cell.merge = self.merges.iter().find_map(|m| m.membership(cd.row, cd.col));
        }
    }
}

/// Merged cell range (0-indexed, inclusive)
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MergeRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl MergeRange {
    #[must_use]
    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.start_row..=self.end_row).contains(&row)
            && (self.start_col..=self.end_col).contains(&col)
    }

    #[must_use]
    pub fn membership(&self, row: u32, col: u32) -> Option<MergeMembership> {
        if !self.contains(row, col) {
            None
        } else if row == self.start_row && col == self.start_col {
            Some(MergeMembership::Anchor)
        } else {
            Some(MergeMembership::Covered)
        }
    }
}

/// `<col>` entry: width for the 1-based column span `min..=max`, in character units.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColWidth {
    pub min: u32,
    pub max: u32,
    pub width: Option<f64>,
    pub custom_width: bool,
    pub hidden: bool,
}

/// Custom height of a 0-indexed row, in points.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RowHeight {
    pub row: u32,
    pub height: f64,
    pub hidden: bool,
}
