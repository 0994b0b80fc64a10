//! Worksheet parsing - parses individual sheet XML into Sheet structs.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::cell_ref::{parse_cell_range, parse_cell_ref};
use crate::error::{Result, ResultExt};
use crate::types::{Cell, ColWidth, MergeRange, RowHeight, Sheet, StyleTable};
use crate::xml_helpers::{attr_bool_default, attr_f64, attr_string, attr_u32};

use super::relationships::SheetInfo;
use super::styles::resolve_cell_value;

/// Cell type tag from the `t` attribute of a `<c>` element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum CellTypeTag {
    Shared,
    Inline,
    Str,
    Bool,
    Error,
    Date,
    Default,
}

pub(super) fn parse_cell_type_tag(value: Option<&str>) -> CellTypeTag {
    match value {
        Some("s") => CellTypeTag::Shared,
        Some("b") => CellTypeTag::Bool,
        Some("e") => CellTypeTag::Error,
        Some("str") => CellTypeTag::Str,
        Some("inlineStr") => CellTypeTag::Inline,
        Some("d") => CellTypeTag::Date,
        _ => CellTypeTag::Default,
    }
}

/// Tracks the current row/column while walking `<row>`/`<c>` elements.
///
/// `r` attributes are optional in SpreadsheetML: a row without one follows
/// the previous row, a cell without one follows the previous cell of its row.
#[derive(Debug, Default)]
pub(crate) struct CellCursor {
    row: Option<u32>,
    col: Option<u32>,
}

impl CellCursor {
    /// Enter a `<row>` element and return its 0-indexed row.
    pub(crate) fn enter_row(&mut self, e: &BytesStart) -> u32 {
        let row = attr_u32(e, b"r")
            .and_then(|r| r.checked_sub(1))
            .unwrap_or_else(|| self.row.map_or(0, |r| r.saturating_add(1)));
        self.row = Some(row);
        self.col = None;
        row
    }

    /// Enter a `<c>` element and return its 0-indexed (row, col).
    pub(crate) fn enter_cell(&mut self, e: &BytesStart) -> (u32, u32) {
        let (row, col) = match attr_string(e, b"r").as_deref().and_then(parse_cell_ref) {
            Some((col, row)) => (row, col),
            None => (
                self.row.unwrap_or(0),
                self.col.map_or(0, |c| c.saturating_add(1)),
            ),
        };
        self.row = Some(row);
        self.col = Some(col);
        (row, col)
    }
}

/// A `<c>` element being read.
#[derive(Debug)]
pub(super) struct PendingCell {
    pub row: u32,
    pub col: u32,
    pub tag: CellTypeTag,
    pub style_idx: Option<u32>,
    /// Formula text and shared-formula marker.
    pub formula: Option<(String, bool)>,
    /// Text of `<v>`.
    pub value: Option<String>,
    /// Concatenated `<is>` text runs.
    pub inline: String,
    text_target: TextTarget,
    in_phonetic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    None,
    Value,
    Formula,
    Inline,
}

impl PendingCell {
    fn start(e: &BytesStart, cursor: &mut CellCursor) -> Self {
        let (row, col) = cursor.enter_cell(e);
        Self {
            row,
            col,
            tag: parse_cell_type_tag(attr_string(e, b"t").as_deref()),
            style_idx: attr_u32(e, b"s"),
            formula: None,
            value: None,
            inline: String::new(),
            text_target: TextTarget::None,
            in_phonetic: false,
        }
    }

    fn push_text(&mut self, text: &str) {
        match self.text_target {
            TextTarget::Value => self.value.get_or_insert_with(String::new).push_str(text),
            TextTarget::Formula => {
                if let Some((formula, _)) = self.formula.as_mut() {
                    formula.push_str(text);
                }
            }
            TextTarget::Inline => self.inline.push_str(text),
            TextTarget::None => {}
        }
    }
}

/// Parse a merge range like "A1:B2"
fn parse_merge_ref(ref_str: &str) -> Option<MergeRange> {
    let (start_row, start_col, end_row, end_col) = parse_cell_range(ref_str)?;
    Some(MergeRange {
        start_row,
        start_col,
        end_row,
        end_col,
    })
}

/// Parse a single worksheet part.
#[allow(clippy::too_many_lines)]
pub(super) fn parse_sheet(
    data: &[u8],
    info: SheetInfo,
    shared_strings: &[String],
    styles: &StyleTable,
) -> Result<Sheet> {
    let context = format!("parsing {} ({})", info.path, info.name);
    let mut sheet = Sheet::new(info.name, info.path);
    sheet.state = info.state;

    let mut xml = Reader::from_reader(data);
    xml.trim_text(false);

    let mut buf = Vec::new();
    let mut cursor = CellCursor::default();
    let mut cell: Option<PendingCell> = None;
    let mut in_sheet_data = false;

    loop {
        buf.clear();
        match xml.read_event_into(&mut buf).or_malformed(&context)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"sheetData" => in_sheet_data = true,
                b"row" if in_sheet_data => read_row(e, &mut cursor, &mut sheet),
                b"c" if in_sheet_data => cell = Some(PendingCell::start(e, &mut cursor)),
                b"v" => {
                    if let Some(c) = cell.as_mut() {
                        c.text_target = TextTarget::Value;
                    }
                }
                b"f" => {
                    if let Some(c) = cell.as_mut() {
                        let shared = attr_string(e, b"t").as_deref() == Some("shared");
                        c.formula = Some((String::new(), shared));
                        c.text_target = TextTarget::Formula;
                    }
                }
                b"rPh" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_phonetic = true;
                    }
                }
                b"t" => {
                    if let Some(c) = cell.as_mut().filter(|c| !c.in_phonetic) {
                        c.text_target = TextTarget::Inline;
                    }
                }
                b"sheetFormatPr" => read_sheet_format(e, &mut sheet),
                b"col" => read_col(e, &mut sheet),
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"row" if in_sheet_data => {
                    read_row(e, &mut cursor, &mut sheet);
                }
                b"c" if in_sheet_data => {
                    let pending = PendingCell::start(e, &mut cursor);
                    let (row, col, style_idx) = (pending.row, pending.col, pending.style_idx);
                    let value = resolve_cell_value(pending, shared_strings, styles, &sheet.name)?;
                    sheet.push_cell(row, col, Cell::new(value, style_idx));
                }
                b"f" => {
                    // Shared-formula follower: <f t="shared" si="0"/>
                    if let Some(c) = cell.as_mut() {
                        let shared = attr_string(e, b"t").as_deref() == Some("shared");
                        c.formula = Some((String::new(), shared));
                    }
                }
                b"mergeCell" => {
                    if let Some(range) = attr_string(e, b"ref").as_deref().and_then(parse_merge_ref)
                    {
                        sheet.merges.push(range);
                    }
                }
                b"sheetFormatPr" => read_sheet_format(e, &mut sheet),
                b"col" => read_col(e, &mut sheet),
                _ => {}
            },
            Event::Text(ref t) => {
                if let Some(c) = cell.as_mut() {
                    if c.text_target != TextTarget::None {
                        c.push_text(&t.unescape().or_malformed(&context)?);
                    }
                }
            }
            Event::CData(ref t) => {
                if let Some(c) = cell.as_mut() {
                    c.push_text(&String::from_utf8_lossy(t));
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"sheetData" => in_sheet_data = false,
                b"v" | b"f" | b"t" => {
                    if let Some(c) = cell.as_mut() {
                        c.text_target = TextTarget::None;
                    }
                }
                b"rPh" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_phonetic = false;
                    }
                }
                b"c" => {
                    if let Some(pending) = cell.take() {
                        let (row, col, style_idx) = (pending.row, pending.col, pending.style_idx);
                        let value =
                            resolve_cell_value(pending, shared_strings, styles, &sheet.name)?;
                        sheet.push_cell(row, col, Cell::new(value, style_idx));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    sheet.apply_merge_membership();
    Ok(sheet)
}

fn read_row(e: &BytesStart, cursor: &mut CellCursor, sheet: &mut Sheet) {
    let row = cursor.enter_row(e);
    let hidden = attr_bool_default(e, b"hidden", false);
    if let Some(height) = attr_f64(e, b"ht") {
        sheet.row_heights.push(RowHeight {
            row,
            height,
            hidden,
        });
    }
}

fn read_col(e: &BytesStart, sheet: &mut Sheet) {
    let (Some(min), Some(max)) = (attr_u32(e, b"min"), attr_u32(e, b"max")) else {
        return;
    };
    sheet.col_widths.push(ColWidth {
        min,
        max,
        width: attr_f64(e, b"width"),
        custom_width: attr_bool_default(e, b"customWidth", false),
        hidden: attr_bool_default(e, b"hidden", false),
    });
}

fn read_sheet_format(e: &BytesStart, sheet: &mut Sheet) {
    sheet.default_col_width = attr_f64(e, b"defaultColWidth");
    sheet.default_row_height = attr_f64(e, b"defaultRowHeight");
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::types::{CellValue, MergeMembership, SheetState};

    fn info() -> SheetInfo {
        SheetInfo {
            name: "7-8AM".into(),
            path: "xl/worksheets/sheet1.xml".into(),
            state: SheetState::Visible,
        }
    }

    fn parse(xml: &str, strings: &[&str]) -> Result<Sheet> {
        let strings: Vec<String> = strings.iter().map(ToString::to_string).collect();
        parse_sheet(xml.as_bytes(), info(), &strings, &StyleTable::default())
    }

    #[test]
    fn resolves_cell_types() {
        let sheet = parse(
            r#"<worksheet><sheetData><row r="1">
                <c r="A1" t="s"><v>0</v></c>
                <c r="B1"><v>42</v></c>
                <c r="C1" t="b"><v>1</v></c>
                <c r="D1" t="inlineStr"><is><r><t>Rich </t></r><r><t>text</t></r></is></c>
                <c r="E1" t="e"><v>#DIV/0!</v></c>
                <c r="F1" t="d"><v>2024-03-01T00:00:00</v></c>
                <c r="G1"><f>SUM(B1:B9)</f><v>10</v></c>
                <c r="H1"><f t="shared" si="0"/><v>3</v></c>
            </row></sheetData></worksheet>"#,
            &["Location"],
        )
        .unwrap();

        assert_eq!(sheet.value_at(0, 0), &CellValue::Text("Location".into()));
        assert_eq!(sheet.value_at(0, 1), &CellValue::Number(42.0));
        assert_eq!(sheet.value_at(0, 2), &CellValue::Boolean(true));
        assert_eq!(sheet.value_at(0, 3), &CellValue::Text("Rich text".into()));
        assert_eq!(sheet.value_at(0, 4), &CellValue::Error("#DIV/0!".into()));
        assert_eq!(
            sheet.value_at(0, 5),
            &CellValue::Date("2024-03-01T00:00:00".into())
        );
        assert_eq!(
            sheet.value_at(0, 6),
            &CellValue::Formula {
                text: "SUM(B1:B9)".into(),
                cached: Some("10".into()),
                shared: false
            }
        );
        assert_eq!(
            sheet.value_at(0, 7),
            &CellValue::Formula {
                text: String::new(),
                cached: Some("3".into()),
                shared: true
            }
        );
    }

    #[test]
    fn missing_references_are_positional() {
        let sheet = parse(
            r#"<worksheet><sheetData>
                <row><c><v>1</v></c><c><v>2</v></c></row>
                <row><c r="C2"><v>3</v></c><c><v>4</v></c></row>
            </sheetData></worksheet>"#,
            &[],
        )
        .unwrap();

        assert_eq!(sheet.value_at(0, 1), &CellValue::Number(2.0));
        assert_eq!(sheet.value_at(1, 2), &CellValue::Number(3.0));
        assert_eq!(sheet.value_at(1, 3), &CellValue::Number(4.0));
    }

    #[test]
    fn reads_layout_and_merges() {
        let sheet = parse(
            r#"<worksheet>
                <sheetFormatPr defaultRowHeight="15"/>
                <cols><col min="1" max="2" width="18.5" customWidth="1"/></cols>
                <sheetData>
                  <row r="1" ht="30" customHeight="1"><c r="A1" t="inlineStr"><is><t>Cars</t></is></c><c r="B1"/></row>
                </sheetData>
                <mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells>
            </worksheet>"#,
            &[],
        )
        .unwrap();

        assert_eq!(sheet.default_row_height, Some(15.0));
        assert_eq!(sheet.col_widths.len(), 1);
        assert_eq!(sheet.col_widths[0].width, Some(18.5));
        assert_eq!(sheet.row_heights[0].height, 30.0);
        assert_eq!(sheet.merges.len(), 1);
        assert_eq!(
            sheet.cell_at(0, 0).unwrap().merge,
            Some(MergeMembership::Anchor)
        );
        assert_eq!(
            sheet.cell_at(0, 1).unwrap().merge,
            Some(MergeMembership::Covered)
        );
    }

    #[test]
    fn bad_shared_string_index_is_malformed() {
        let err = parse(
            r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>7</v></c></row></sheetData></worksheet>"#,
            &["only"],
        )
        .unwrap_err();
        assert_eq!(err.kind(), "malformed_workbook");
        assert!(err.to_string().contains("7-8AM!A1"));
    }

    #[test]
    fn non_numeric_value_is_malformed() {
        let err = parse(
            r#"<worksheet><sheetData><row r="1"><c r="A1"><v>lots</v></c></row></sheetData></worksheet>"#,
            &[],
        )
        .unwrap_err();
        assert_eq!(err.kind(), "malformed_workbook");
    }
}
