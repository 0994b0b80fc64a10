//! Stream-patch worksheet XML with changed cell values.
//!
//! The original part is replayed event by event; only the text of `<v>`
//! inside a dirty `<c>` is replaced. Attributes (including the style index),
//! formulas, whitespace and unknown elements are written back as read.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, BTreeSet};

use crate::cell_ref::cell_address;
use crate::error::{Result, ResultExt, XlcountError};
use crate::parser::worksheet::CellCursor;
use crate::types::{CellValue, Sheet};

/// Dirty cell currently being replayed.
struct OpenCell {
    pos: (u32, u32),
    wrote_value: bool,
    in_value: bool,
}

/// Rewrite `<v>` of every dirty cell of `sheet` in its original part `xml`.
pub(crate) fn patch_sheet_xml(xml: &[u8], sheet: &Sheet) -> Result<Vec<u8>> {
    let replacements = dirty_values(sheet)?;
    let mut remaining: BTreeSet<(u32, u32)> = replacements.keys().copied().collect();
    let context = format!("rewriting {} ({})", sheet.path, sheet.name);
    let at = |(row, col): (u32, u32)| format!("{}!{}", sheet.name, cell_address(row, col));

    let mut reader = Reader::from_reader(xml);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 64));

    let mut buf = Vec::new();
    let mut cursor = CellCursor::default();
    let mut in_sheet_data = false;
    let mut open: Option<OpenCell> = None;

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).or_serialization(&context)?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sheetData" => {
                in_sheet_data = matches!(event, Event::Start(_));
            }
            Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => in_sheet_data = false,
            Event::Start(ref e) | Event::Empty(ref e)
                if in_sheet_data && e.local_name().as_ref() == b"row" =>
            {
                cursor.enter_row(e);
            }
            Event::Start(ref e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let pos = cursor.enter_cell(e);
                if replacements.contains_key(&pos) {
                    open = Some(OpenCell {
                        pos,
                        wrote_value: false,
                        in_value: false,
                    });
                }
            }
            Event::Empty(ref e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let pos = cursor.enter_cell(e);
                if replacements.contains_key(&pos) {
                    return Err(XlcountError::Serialization(format!(
                        "{}: cell has no <v> element to rewrite",
                        at(pos)
                    )));
                }
            }
            Event::Start(ref e) if e.local_name().as_ref() == b"v" => {
                if let Some(cell) = open.as_mut() {
                    cell.in_value = true;
                    if let Some(text) = replacements.get(&cell.pos) {
                        writer.write_event(&event).or_serialization(&context)?;
                        writer
                            .write_event(Event::Text(BytesText::new(text)))
                            .or_serialization(&context)?;
                        cell.wrote_value = true;
                        continue;
                    }
                }
            }
            Event::Empty(ref e) if e.local_name().as_ref() == b"v" => {
                if let Some(cell) = open.as_mut() {
                    if let Some(text) = replacements.get(&cell.pos) {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        writer
                            .write_event(Event::Start(BytesStart::new(name.as_str())))
                            .and_then(|_| writer.write_event(Event::Text(BytesText::new(text))))
                            .and_then(|_| writer.write_event(Event::End(BytesEnd::new(name.as_str()))))
                            .or_serialization(&context)?;
                        cell.wrote_value = true;
                        continue;
                    }
                }
            }
            Event::Text(_) | Event::CData(_) if open.as_ref().is_some_and(|c| c.in_value) => {
                continue;
            }
            Event::End(ref e) if e.local_name().as_ref() == b"v" => {
                if let Some(cell) = open.as_mut() {
                    cell.in_value = false;
                }
            }
            Event::End(ref e) if e.local_name().as_ref() == b"c" => {
                if let Some(cell) = open.take() {
                    if !cell.wrote_value {
                        return Err(XlcountError::Serialization(format!(
                            "{}: cell has no <v> element to rewrite",
                            at(cell.pos)
                        )));
                    }
                    remaining.remove(&cell.pos);
                }
            }
            _ => {}
        }
        writer.write_event(&event).or_serialization(&context)?;
    }

    if let Some(&pos) = remaining.iter().next() {
        return Err(XlcountError::Serialization(format!(
            "{}: changed cell not found in {}",
            at(pos),
            sheet.path
        )));
    }

    Ok(writer.into_inner())
}

/// New `<v>` text for every dirty cell. Dirty cells must hold a number.
fn dirty_values(sheet: &Sheet) -> Result<BTreeMap<(u32, u32), String>> {
    sheet
        .dirty_cells()
        .map(|(row, col)| match sheet.value_at(row, col) {
            CellValue::Number(n) if n.is_finite() => Ok(((row, col), n.to_string())),
            other => Err(XlcountError::Serialization(format!(
                "{}!{}: changed cell holds {other:?}, expected a finite number",
                sheet.name,
                cell_address(row, col)
            ))),
        })
        .collect()
}
