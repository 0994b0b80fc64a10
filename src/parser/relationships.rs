//! Relationship parsing - workbook relationships, workbook.xml and shared strings.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

use crate::error::{Result, ResultExt, XlcountError};
use crate::types::{DefinedName, SheetState};
use crate::xml_helpers::{attr_bool_default, attr_string, attr_string_local, attr_u32, resolve_xl_target};

use super::read_part;

/// Workbook relationships parsed from xl/_rels/workbook.xml.rels
///
/// Paths are resolved relative to the xl/ directory and stored as full paths.
#[derive(Default, Debug)]
pub(super) struct WorkbookRelationships {
    /// Map of rId -> full path for worksheet relationships
    /// e.g., "rId1" -> "xl/worksheets/sheet1.xml"
    pub worksheets: HashMap<String, String>,
    /// Path to shared strings file (e.g., "xl/sharedStrings.xml")
    pub shared_strings: Option<String>,
    /// Path to styles file (e.g., "xl/styles.xml")
    pub styles: Option<String>,
}

/// Sheet metadata from workbook.xml
#[derive(Debug)]
pub(super) struct SheetInfo {
    pub name: String,
    pub path: String,
    pub state: SheetState,
}

/// What xl/workbook.xml declares.
#[derive(Debug, Default)]
pub(super) struct WorkbookInfo {
    pub sheets: Vec<SheetInfo>,
    pub defined_names: Vec<DefinedName>,
    pub date1904: bool,
}

/// Parse workbook relationships from xl/_rels/workbook.xml.rels
pub(super) fn parse_workbook_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<WorkbookRelationships> {
    let mut rels = WorkbookRelationships::default();

    let Some(data) = read_part(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(rels); // Relationships file is optional
    };

    let mut xml = Reader::from_reader(data.as_slice());
    xml.trim_text(true);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match xml
            .read_event_into(&mut buf)
            .or_malformed("parsing xl/_rels/workbook.xml.rels")?
        {
            Event::Empty(ref e) | Event::Start(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if attr_string(e, b"TargetMode").as_deref() == Some("External") {
                    continue;
                }
                let id = attr_string(e, b"Id").unwrap_or_default();
                let target = attr_string(e, b"Target").unwrap_or_default();
                let rel_type = attr_string(e, b"Type").unwrap_or_default();
                let full_path = resolve_xl_target(&target);

                if rel_type.ends_with("/worksheet") && !id.is_empty() && !target.is_empty() {
                    rels.worksheets.insert(id, full_path);
                } else if rel_type.ends_with("/sharedStrings") {
                    rels.shared_strings = Some(full_path);
                } else if rel_type.ends_with("/styles") {
                    rels.styles = Some(full_path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rels)
}

/// Get sheets, defined names and the date1904 flag from xl/workbook.xml
pub(super) fn parse_workbook_info<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    relationships: &HashMap<String, String>,
) -> Result<WorkbookInfo> {
    let data = read_part(archive, "xl/workbook.xml")?
        .ok_or_else(|| XlcountError::MalformedWorkbook("missing xl/workbook.xml".into()))?;

    let mut xml = Reader::from_reader(data.as_slice());
    xml.trim_text(false);

    let mut info = WorkbookInfo::default();
    let mut buf = Vec::new();
    // Defined name being collected: (name, localSheetId, text)
    let mut pending_name: Option<(String, Option<u32>, String)> = None;

    loop {
        buf.clear();
        match xml
            .read_event_into(&mut buf)
            .or_malformed("parsing xl/workbook.xml")?
        {
            Event::Empty(ref e) | Event::Start(ref e) => match e.local_name().as_ref() {
                b"workbookPr" => {
                    info.date1904 = attr_bool_default(e, b"date1904", false);
                }
                b"sheet" => {
                    let Some(name) = attr_string(e, b"name").filter(|n| !n.is_empty()) else {
                        continue;
                    };
                    let state = match attr_string(e, b"state").as_deref() {
                        Some("hidden") => SheetState::Hidden,
                        Some("veryHidden") => SheetState::VeryHidden,
                        _ => SheetState::Visible,
                    };
                    // r:id, whatever the prefix
                    let r_id = attr_string_local(e, b"id").unwrap_or_default();
                    let path = relationships.get(&r_id).cloned().unwrap_or_else(|| {
                        let idx = info.sheets.len() + 1;
                        format!("xl/worksheets/sheet{idx}.xml")
                    });
                    info.sheets.push(SheetInfo { name, path, state });
                }
                b"definedName" => {
                    if let Some(name) = attr_string(e, b"name") {
                        pending_name = Some((name, attr_u32(e, b"localSheetId"), String::new()));
                    }
                }
                _ => {}
            },
            Event::Text(ref t) => {
                if let Some((_, _, value)) = pending_name.as_mut() {
                    value.push_str(&t.unescape().or_malformed("parsing xl/workbook.xml")?);
                }
            }
            Event::End(ref e) if e.local_name().as_ref() == b"definedName" => {
                if let Some((name, local_sheet_id, value)) = pending_name.take() {
                    info.defined_names.push(DefinedName {
                        name,
                        value,
                        local_sheet_id,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(info)
}

/// Parse shared strings from shared strings file
///
/// Rich-text runs of one `<si>` are concatenated; phonetic runs (`<rPh>`) are skipped.
pub(super) fn parse_shared_strings<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: Option<&str>,
) -> Result<Vec<String>> {
    let sst_path = path.unwrap_or("xl/sharedStrings.xml");
    let Some(data) = read_part(archive, sst_path)? else {
        return Ok(Vec::new()); // SharedStrings is optional
    };
    let context = format!("parsing {sst_path}");

    let mut xml = Reader::from_reader(data.as_slice());
    xml.trim_text(false);

    let mut strings = Vec::new();
    let mut buf = Vec::new();
    let mut current_string = String::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match xml.read_event_into(&mut buf).or_malformed(&context)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current_string.clear();
                }
                b"rPh" => in_phonetic = true,
                b"t" if in_si && !in_phonetic => in_t = true,
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Event::Text(ref e) if in_t => {
                current_string.push_str(&e.unescape().or_malformed(&context)?);
            }
            Event::CData(ref e) if in_t => {
                current_string.push_str(&String::from_utf8_lossy(e));
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = false;
                    strings.push(std::mem::take(&mut current_string));
                }
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}
