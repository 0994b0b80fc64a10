//! In-memory XLSX packages for the integration tests.
//!
//! ```rust
//! let xlsx = XlsxBuilder::new()
//!     .sheet(
//!         SheetBuilder::new("7-8AM")
//!             .row(1, &["Location", "Cars"])
//!             .cell("A2", "North Rd", None)
//!             .cell("B2", 100.0, Some(StyleBuilder::new().number_format("#,##0"))),
//!     )
//!     .build();
//! let wb = xlcount::parser::load(&xlsx).unwrap();
//! ```
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic,
    clippy::cast_possible_truncation,
    clippy::cast_lossless
)]

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{Cursor, Read, Write};
use xlcount::cell_ref::{cell_address, parse_cell_ref};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Font, fill and number format of one `cellXfs` entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleBuilder {
    bold: bool,
    fill: Option<String>,
    format_code: Option<String>,
}

impl StyleBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bold(self) -> Self {
        Self { bold: true, ..self }
    }

    /// Solid fill; `#rrggbb` or `aarrggbb`.
    #[must_use]
    pub fn bg_color(self, color: &str) -> Self {
        Self {
            fill: Some(normalize_color(color)),
            ..self
        }
    }

    /// Built-in codes resolve to their reserved ids, others get ids from 164.
    #[must_use]
    pub fn number_format(self, code: &str) -> Self {
        Self {
            format_code: Some(code.to_owned()),
            ..self
        }
    }
}

/// What a fixture cell holds, before it is encoded.
#[derive(Debug, Clone)]
pub enum CellValue {
    /// Goes through `sharedStrings.xml`.
    String(String),
    Number(f64),
    Boolean(bool),
    Error(String),
    /// `t="inlineStr"`
    InlineString(String),
    Formula { formula: String, cached: Option<f64> },
    /// Style only, no `<v>`.
    Empty,
}

impl From<&str> for CellValue {
    fn from(text: &str) -> Self {
        Self::String(text.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<bool> for CellValue {
    fn from(flag: bool) -> Self {
        Self::Boolean(flag)
    }
}

macro_rules! numeric_cell {
    ($($t:ty),*) => {$(
        impl From<$t> for CellValue {
            fn from(n: $t) -> Self {
                Self::Number(f64::from(n))
            }
        }
    )*};
}

numeric_cell!(f64, i32, u32);

pub fn formula(text: &str, cached: Option<f64>) -> CellValue {
    CellValue::Formula {
        formula: text.to_owned(),
        cached,
    }
}

#[derive(Debug, Clone)]
struct Placed {
    at: String,
    value: CellValue,
    style: Option<StyleBuilder>,
}

/// One worksheet part.
#[derive(Debug, Clone, Default)]
pub struct SheetBuilder {
    name: String,
    cells: Vec<Placed>,
    merges: Vec<String>,
    /// `(min, max, width)`, 1-based columns.
    cols: Vec<(u32, u32, f64)>,
    /// 1-based row to custom height.
    heights: BTreeMap<u32, f64>,
    raw_xml: Option<String>,
}

impl SheetBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn cell(mut self, at: &str, value: impl Into<CellValue>, style: Option<StyleBuilder>) -> Self {
        self.cells.push(Placed {
            at: at.to_owned(),
            value: value.into(),
            style,
        });
        self
    }

    /// Unstyled values across 1-based `row`, starting at column A.
    #[must_use]
    pub fn row<V: Into<CellValue> + Clone>(self, row: u32, values: &[V]) -> Self {
        values.iter().zip(0_u32..).fold(self, |sheet, (value, col)| {
            sheet.cell(&cell_address(row.saturating_sub(1), col), value.clone(), None)
        })
    }

    #[must_use]
    pub fn styled_cell(self, at: &str, style: StyleBuilder) -> Self {
        self.cell(at, CellValue::Empty, Some(style))
    }

    #[must_use]
    pub fn merge(mut self, range: &str) -> Self {
        self.merges.push(range.to_owned());
        self
    }

    #[must_use]
    pub fn col_width(mut self, min: u32, max: u32, width: f64) -> Self {
        self.cols.push((min, max, width));
        self
    }

    #[must_use]
    pub fn row_height(mut self, row: u32, height: f64) -> Self {
        self.heights.insert(row, height);
        self
    }

    /// Ship this XML as the worksheet part instead of generating one.
    #[must_use]
    pub fn raw_xml(mut self, xml: &str) -> Self {
        self.raw_xml = Some(xml.to_owned());
        self
    }
}

/// A whole package: workbook, styles, shared strings, sheets and any extra parts.
#[derive(Debug, Default)]
pub struct XlsxBuilder {
    sheets: Vec<SheetBuilder>,
    defined_names: Vec<(String, String)>,
    calc_pr: Option<String>,
    extra_parts: Vec<(String, Vec<u8>)>,
}

impl XlsxBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sheet(mut self, sheet: SheetBuilder) -> Self {
        self.sheets.push(sheet);
        self
    }

    #[must_use]
    pub fn defined_name(mut self, name: &str, value: &str) -> Self {
        self.defined_names.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Attributes for `<calcPr>`, e.g. `calcId="191029"`.
    #[must_use]
    pub fn calc_pr(mut self, attrs: &str) -> Self {
        self.calc_pr = Some(attrs.to_owned());
        self
    }

    /// A part the loader never reads (docProps, custom XML).
    #[must_use]
    pub fn extra_part(mut self, path: &str, data: &[u8]) -> Self {
        self.extra_parts.push((path.to_owned(), data.to_vec()));
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut styles = StylePool::default();
        let mut strings = SharedStrings::default();
        for cell in self.sheets.iter().flat_map(|s| &s.cells) {
            if let Some(style) = &cell.style {
                styles.intern(style);
            }
            if let CellValue::String(s) = &cell.value {
                strings.intern(s);
            }
        }

        let sheet_count = self.sheets.len();
        let mut parts: Vec<(String, String)> = vec![
            ("[Content_Types].xml".into(), content_types(sheet_count)),
            (
                "_rels/.rels".into(),
                relationships(&[("officeDocument", "xl/workbook.xml".into())]),
            ),
            ("xl/_rels/workbook.xml.rels".into(), workbook_rels(sheet_count)),
            ("xl/workbook.xml".into(), self.workbook_xml()),
            ("xl/styles.xml".into(), styles.to_xml()),
        ];
        if !strings.0.is_empty() {
            parts.push(("xl/sharedStrings.xml".into(), strings.to_xml()));
        }
        for (i, sheet) in self.sheets.iter().enumerate() {
            let xml = match &sheet.raw_xml {
                Some(raw) => raw.clone(),
                None => sheet_xml(sheet, &strings, &styles),
            };
            parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), xml));
        }

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let generated = parts.iter().map(|(p, xml)| (p.as_str(), xml.as_bytes()));
        let extra = self.extra_parts.iter().map(|(p, data)| (p.as_str(), data.as_slice()));
        for (path, data) in generated.chain(extra) {
            zip.start_file(path, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn workbook_xml(&self) -> String {
        let mut body = String::from(r#"<workbookPr defaultThemeVersion="164011"/><sheets>"#);
        for (i, sheet) in self.sheets.iter().enumerate() {
            let n = i + 1;
            write!(
                body,
                r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
                escape(&sheet.name)
            )
            .unwrap();
        }
        body.push_str("</sheets>");

        if !self.defined_names.is_empty() {
            body.push_str("<definedNames>");
            for (name, value) in &self.defined_names {
                write!(
                    body,
                    r#"<definedName name="{}">{}</definedName>"#,
                    escape(name),
                    escape(value)
                )
                .unwrap();
            }
            body.push_str("</definedNames>");
        }
        if let Some(attrs) = &self.calc_pr {
            write!(body, "<calcPr {attrs}/>").unwrap();
        }

        document(
            "workbook",
            &format!(r#"{MAIN_NS} xmlns:r="{OFFICE_REL_NS}""#),
            &body,
        )
    }
}

// ============================================================================
// Styles and Shared Strings
// ============================================================================

/// Distinct styles in first-use order; the `cellXfs` index is position + 1.
#[derive(Debug, Default)]
struct StylePool {
    /// Solid fill colors, after the two mandatory fills.
    fills: Vec<String>,
    /// Custom number formats, ids from 164.
    num_fmts: Vec<String>,
    styles: Vec<StyleBuilder>,
}

impl StylePool {
    fn intern(&mut self, style: &StyleBuilder) {
        if self.styles.contains(style) {
            return;
        }
        if let Some(color) = &style.fill {
            if !self.fills.contains(color) {
                self.fills.push(color.clone());
            }
        }
        if let Some(code) = &style.format_code {
            if builtin_format_id(code).is_none() && !self.num_fmts.contains(code) {
                self.num_fmts.push(code.clone());
            }
        }
        self.styles.push(style.clone());
    }

    fn index_of(&self, style: &StyleBuilder) -> Option<usize> {
        self.styles.iter().position(|s| s == style).map(|i| i + 1)
    }

    fn fill_id(&self, style: &StyleBuilder) -> usize {
        style
            .fill
            .as_ref()
            .and_then(|c| self.fills.iter().position(|f| f == c))
            .map_or(0, |i| i + 2)
    }

    fn num_fmt_id(&self, style: &StyleBuilder) -> u32 {
        let Some(code) = &style.format_code else {
            return 0;
        };
        builtin_format_id(code)
            .or_else(|| {
                self.num_fmts
                    .iter()
                    .position(|f| f == code)
                    .map(|i| 164 + i as u32)
            })
            .unwrap_or(0)
    }

    fn to_xml(&self) -> String {
        let mut body = String::new();

        if !self.num_fmts.is_empty() {
            write!(body, r#"<numFmts count="{}">"#, self.num_fmts.len()).unwrap();
            for (i, code) in self.num_fmts.iter().enumerate() {
                write!(
                    body,
                    r#"<numFmt numFmtId="{}" formatCode="{}"/>"#,
                    164 + i,
                    escape(code)
                )
                .unwrap();
            }
            body.push_str("</numFmts>");
        }

        // Font 0 regular, font 1 bold
        body.push_str(concat!(
            r#"<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font>"#,
            r#"<font><b/><sz val="11"/><name val="Calibri"/></font></fonts>"#
        ));

        write!(
            body,
            concat!(
                r#"<fills count="{}"><fill><patternFill patternType="none"/></fill>"#,
                r#"<fill><patternFill patternType="gray125"/></fill>"#
            ),
            self.fills.len() + 2
        )
        .unwrap();
        for rgb in &self.fills {
            write!(
                body,
                r#"<fill><patternFill patternType="solid"><fgColor rgb="{rgb}"/><bgColor indexed="64"/></patternFill></fill>"#
            )
            .unwrap();
        }
        body.push_str("</fills>");

        body.push_str(concat!(
            r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
            r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#
        ));

        write!(
            body,
            r#"<cellXfs count="{}"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
            self.styles.len() + 1
        )
        .unwrap();
        for style in &self.styles {
            let num_fmt = self.num_fmt_id(style);
            let font = u32::from(style.bold);
            let fill = self.fill_id(style);
            write!(
                body,
                r#"<xf numFmtId="{num_fmt}" fontId="{font}" fillId="{fill}" borderId="0" xfId="0""#
            )
            .unwrap();
            for (on, flag) in [
                (num_fmt > 0, "applyNumberFormat"),
                (style.bold, "applyFont"),
                (fill > 0, "applyFill"),
            ] {
                if on {
                    write!(body, r#" {flag}="1""#).unwrap();
                }
            }
            body.push_str("/>");
        }
        body.push_str("</cellXfs>");
        body.push_str(
            r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
        );

        document("styleSheet", MAIN_NS, &body)
    }
}

/// Shared string table in first-use order.
#[derive(Debug, Default)]
struct SharedStrings(Vec<String>);

impl SharedStrings {
    fn intern(&mut self, s: &str) {
        if !self.0.iter().any(|x| x == s) {
            self.0.push(s.to_string());
        }
    }

    fn index_of(&self, s: &str) -> usize {
        self.0.iter().position(|x| x == s).unwrap_or(0)
    }

    fn to_xml(&self) -> String {
        let body: String = self
            .0
            .iter()
            .map(|s| format!(r#"<si><t xml:space="preserve">{}</t></si>"#, escape(s)))
            .collect();
        let n = self.0.len();
        document(
            "sst",
            &format!(r#"{MAIN_NS} count="{n}" uniqueCount="{n}""#),
            &body,
        )
    }
}

// ============================================================================
// Package Parts
// ============================================================================

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = r#"xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main""#;
const OFFICE_REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const SPREADSHEETML: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml";

const BUILTIN_FORMATS: &[(u32, &str)] = &[
    (0, "General"),
    (1, "0"),
    (2, "0.00"),
    (3, "#,##0"),
    (4, "#,##0.00"),
    (9, "0%"),
    (10, "0.00%"),
    (14, "mm-dd-yy"),
    (15, "d-mmm-yy"),
    (18, "h:mm AM/PM"),
    (20, "h:mm"),
    (21, "h:mm:ss"),
    (49, "@"),
];

fn builtin_format_id(code: &str) -> Option<u32> {
    BUILTIN_FORMATS
        .iter()
        .find(|(_, builtin)| *builtin == code)
        .map(|(id, _)| *id)
}

/// `#rgb`, `rrggbb` or `aarrggbb` to upper-case ARGB.
fn normalize_color(color: &str) -> String {
    let hex = color.trim_start_matches('#').to_ascii_uppercase();
    match hex.len() {
        6 => format!("FF{hex}"),
        _ => hex,
    }
}

/// Escape text and double-quoted attribute values.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn document(root: &str, root_attrs: &str, body: &str) -> String {
    format!("{DECLARATION}<{root} {root_attrs}>{body}</{root}>")
}

fn content_types(sheet_count: usize) -> String {
    let mut body = String::from(concat!(
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
        r#"<Default Extension="xml" ContentType="application/xml"/>"#
    ));
    let fixed = [
        ("/xl/workbook.xml".to_string(), "sheet.main"),
        ("/xl/styles.xml".to_string(), "styles"),
        ("/xl/sharedStrings.xml".to_string(), "sharedStrings"),
    ];
    let sheets = (1..=sheet_count).map(|i| (format!("/xl/worksheets/sheet{i}.xml"), "worksheet"));
    for (part, kind) in fixed.into_iter().chain(sheets) {
        write!(
            body,
            r#"<Override PartName="{part}" ContentType="{SPREADSHEETML}.{kind}+xml"/>"#
        )
        .unwrap();
    }
    document(
        "Types",
        r#"xmlns="http://schemas.openxmlformats.org/package/2006/content-types""#,
        &body,
    )
}

/// Relationship part with ids `rId1..` in the given order.
fn relationships(targets: &[(&str, String)]) -> String {
    let body: String = targets
        .iter()
        .enumerate()
        .map(|(i, (kind, target))| {
            format!(
                r#"<Relationship Id="rId{}" Type="{OFFICE_REL_NS}/{kind}" Target="{target}"/>"#,
                i + 1
            )
        })
        .collect();
    document(
        "Relationships",
        r#"xmlns="http://schemas.openxmlformats.org/package/2006/relationships""#,
        &body,
    )
}

/// Worksheets take `rId1..rIdN` to match `workbook.xml`.
fn workbook_rels(sheet_count: usize) -> String {
    let mut targets: Vec<(&str, String)> = (1..=sheet_count)
        .map(|i| ("worksheet", format!("worksheets/sheet{i}.xml")))
        .collect();
    targets.push(("styles", "styles.xml".into()));
    targets.push(("sharedStrings", "sharedStrings.xml".into()));
    relationships(&targets)
}

fn sheet_xml(sheet: &SheetBuilder, strings: &SharedStrings, styles: &StylePool) -> String {
    let mut body = String::from(r#"<sheetFormatPr defaultRowHeight="15"/>"#);

    if !sheet.cols.is_empty() {
        body.push_str("<cols>");
        for (min, max, width) in &sheet.cols {
            write!(
                body,
                r#"<col min="{min}" max="{max}" width="{width}" customWidth="1"/>"#
            )
            .unwrap();
        }
        body.push_str("</cols>");
    }

    // 0-based row -> 0-based col -> cell; a later cell at the same reference wins
    let mut rows: BTreeMap<u32, BTreeMap<u32, &Placed>> = BTreeMap::new();
    for cell in &sheet.cells {
        let (col, row) = parse_cell_ref(&cell.at)
            .unwrap_or_else(|| panic!("bad cell reference {:?}", cell.at));
        rows.entry(row).or_default().insert(col, cell);
    }
    for row in sheet.heights.keys() {
        rows.entry(row.saturating_sub(1)).or_default();
    }

    body.push_str("<sheetData>");
    for (row, cells) in &rows {
        write!(body, r#"<row r="{}""#, row + 1).unwrap();
        if let Some(height) = sheet.heights.get(&(row + 1)) {
            write!(body, r#" ht="{height}" customHeight="1""#).unwrap();
        }
        body.push('>');
        for cell in cells.values() {
            body.push_str(&cell_xml(cell, strings, styles));
        }
        body.push_str("</row>");
    }
    body.push_str("</sheetData>");

    if !sheet.merges.is_empty() {
        write!(body, r#"<mergeCells count="{}">"#, sheet.merges.len()).unwrap();
        for range in &sheet.merges {
            write!(body, r#"<mergeCell ref="{range}"/>"#).unwrap();
        }
        body.push_str("</mergeCells>");
    }
    body.push_str(
        r#"<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>"#,
    );

    document("worksheet", MAIN_NS, &body)
}

fn cell_xml(cell: &Placed, strings: &SharedStrings, styles: &StylePool) -> String {
    let r = &cell.at;
    let s = cell
        .style
        .as_ref()
        .and_then(|style| styles.index_of(style))
        .map(|i| format!(r#" s="{i}""#))
        .unwrap_or_default();

    match &cell.value {
        CellValue::String(text) => {
            format!(r#"<c r="{r}"{s} t="s"><v>{}</v></c>"#, strings.index_of(text))
        }
        CellValue::Number(n) => format!(r#"<c r="{r}"{s}><v>{n}</v></c>"#),
        CellValue::Boolean(b) => format!(r#"<c r="{r}"{s} t="b"><v>{}</v></c>"#, u8::from(*b)),
        CellValue::Error(e) => format!(r#"<c r="{r}"{s} t="e"><v>{}</v></c>"#, escape(e)),
        CellValue::InlineString(text) => format!(
            r#"<c r="{r}"{s} t="inlineStr"><is><t>{}</t></is></c>"#,
            escape(text)
        ),
        CellValue::Formula { formula, cached } => {
            let v = cached.map(|v| format!("<v>{v}</v>")).unwrap_or_default();
            format!(r#"<c r="{r}"{s}><f>{}</f>{v}</c>"#, escape(formula))
        }
        CellValue::Empty => format!(r#"<c r="{r}"{s}/>"#),
    }
}

// ============================================================================
// Package Inspection
// ============================================================================

/// Entry names in archive order (`ZipArchive::file_names` is unordered).
pub fn part_names(xlsx: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(xlsx)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index_raw(i).unwrap().name().to_string())
        .collect();
    names
}

/// Decompressed content of one part.
pub fn read_part(xlsx: &[u8], path: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(xlsx)).unwrap();
    let mut file = archive
        .by_name(path)
        .unwrap_or_else(|_| panic!("missing part {path}"));
    let mut data = Vec::new();
    file.read_to_end(&mut data).unwrap();
    data
}

/// Decompressed content of one part as text.
pub fn read_part_string(xlsx: &[u8], path: &str) -> String {
    String::from_utf8(read_part(xlsx, path)).unwrap()
}

// ============================================================================
// Traffic Count Fixtures
// ============================================================================

/// One sheet: `Location | <vehicle columns...>` header, one row per location.
pub fn traffic_sheet(name: &str, vehicles: &[&str], rows: &[(&str, Vec<f64>)]) -> SheetBuilder {
    let header = StyleBuilder::new().bold().bg_color("#D9E1F2");
    let mut sheet = SheetBuilder::new(name)
        .cell("A1", "Location", Some(header.clone()))
        .col_width(1, 1, 24.0)
        .row_height(1, 30.0);

    for (i, vehicle) in vehicles.iter().enumerate() {
        sheet = sheet.cell(&cell_address(0, i as u32 + 1), *vehicle, Some(header.clone()));
    }

    for (r, (location, counts)) in rows.iter().enumerate() {
        let row = r as u32 + 2;
        sheet = sheet.cell(&format!("A{row}"), *location, None);
        for (i, count) in counts.iter().enumerate() {
            sheet = sheet.cell(&cell_address(row - 1, i as u32 + 1), *count, None);
        }
    }

    sheet
}

/// Workbook with the given sheets only.
pub fn workbook(sheets: Vec<SheetBuilder>) -> Vec<u8> {
    sheets
        .into_iter()
        .fold(XlsxBuilder::new(), XlsxBuilder::sheet)
        .build()
}
