//! Style table and value resolution.
//!
//! Only the number-format side of `styles.xml` is read: which `numFmtId` each
//! `cellXfs` entry uses and the custom format codes. Fonts, fills and borders
//! are carried through the package untouched.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Read, Seek};
use zip::ZipArchive;

use crate::cell_ref::cell_address;
use crate::error::{Result, ResultExt, XlcountError};
use crate::types::{CellValue, StyleTable};
use crate::xml_helpers::{attr_string, attr_u32};

use super::read_part;
use super::worksheet::{CellTypeTag, PendingCell};

/// Parse the number-format view of `styles.xml`. A missing part yields an empty table.
pub(super) fn parse_style_table<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: Option<&str>,
) -> Result<StyleTable> {
    let styles_path = path.unwrap_or("xl/styles.xml");
    let Some(data) = read_part(archive, styles_path)? else {
        return Ok(StyleTable::default());
    };
    parse_style_table_xml(&data).or_else(|e| match e {
        XlcountError::MalformedWorkbook(msg) => Err(XlcountError::MalformedWorkbook(format!(
            "{styles_path}: {msg}"
        ))),
        other => Err(other),
    })
}

fn parse_style_table_xml(data: &[u8]) -> Result<StyleTable> {
    let mut xml = Reader::from_reader(data);
    xml.trim_text(true);

    let mut table = StyleTable::default();
    let mut buf = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        buf.clear();
        match xml.read_event_into(&mut buf).or_malformed("parsing styles")? {
            Event::Start(ref e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = true,
            Event::End(ref e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"xf" if in_cell_xfs => {
                    table.cell_xfs.push(attr_u32(e, b"numFmtId").unwrap_or(0));
                }
                b"numFmt" => {
                    if let (Some(id), Some(code)) =
                        (attr_u32(e, b"numFmtId"), attr_string(e, b"formatCode"))
                    {
                        table.num_fmts.insert(id, code);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(table)
}

/// Resolve a finished `<c>` element into a [`CellValue`].
///
/// Formulas win over the type tag; their cached `<v>` text is kept as-is.
pub(super) fn resolve_cell_value(
    cell: PendingCell,
    shared_strings: &[String],
    styles: &StyleTable,
    sheet_name: &str,
) -> Result<CellValue> {
    let PendingCell {
        row,
        col,
        tag,
        style_idx,
        formula,
        value,
        inline,
        ..
    } = cell;

    if let Some((text, shared)) = formula {
        let cached = match tag {
            CellTypeTag::Inline => Some(inline),
            _ => value,
        };
        return Ok(CellValue::Formula {
            text,
            cached,
            shared,
        });
    }

    let at = || format!("{sheet_name}!{}", cell_address(row, col));

    Ok(match tag {
        CellTypeTag::Inline => CellValue::Text(inline),
        CellTypeTag::Str => CellValue::Text(value.unwrap_or_default()),
        CellTypeTag::Shared => match value {
            None => CellValue::Empty,
            Some(raw) => {
                let text = raw
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| shared_strings.get(idx));
                match text {
                    Some(s) => CellValue::Text(s.clone()),
                    None => {
                        return Err(XlcountError::MalformedWorkbook(format!(
                            "{}: shared string index {raw:?} out of range ({} strings)",
                            at(),
                            shared_strings.len()
                        )))
                    }
                }
            }
        },
        CellTypeTag::Bool => match value.as_deref().map(str::trim) {
            Some("1" | "true") => CellValue::Boolean(true),
            Some("0" | "false") => CellValue::Boolean(false),
            Some(other) => CellValue::Text(other.to_string()),
            None => CellValue::Empty,
        },
        CellTypeTag::Error => value.map_or(CellValue::Empty, CellValue::Error),
        CellTypeTag::Date => value.map_or(CellValue::Empty, CellValue::Date),
        CellTypeTag::Default => match value {
            None => CellValue::Empty,
            Some(raw) if raw.trim().is_empty() => CellValue::Empty,
            Some(raw) => {
                let number = raw.trim().parse::<f64>().map_err(|_| {
                    XlcountError::MalformedWorkbook(format!(
                        "{}: numeric cell holds {raw:?}",
                        at()
                    ))
                })?;
                if styles.is_date_style(style_idx) {
                    CellValue::Date(raw)
                } else {
                    CellValue::Number(number)
                }
            }
        },
    })
}
