//! Workbook loader
//!
//! Reads the parts of the XLSX package the transform needs (workbook,
//! relationships, shared strings, number formats, worksheets) into a
//! [`Workbook`]. Every other part stays in the package bytes and is copied
//! through untouched on save.

mod relationships;
mod styles;
pub(crate) mod worksheet;

use std::io::{Cursor, Read, Seek};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{Result, ResultExt, XlcountError};
use crate::types::Workbook;

use relationships::{parse_shared_strings, parse_workbook_info, parse_workbook_relationships};
use styles::parse_style_table;
use worksheet::parse_sheet;

/// OLE2 compound-file signature: legacy `.xls` or an encrypted OOXML package.
const CFB_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Parse an XLSX file from bytes.
///
/// # Errors
/// `MalformedWorkbook` for empty input, non-XLSX formats, unreadable parts,
/// a workbook without sheets or malformed worksheet XML.
pub fn load(data: &[u8]) -> Result<Workbook> {
    if data.is_empty() {
        return Err(XlcountError::MalformedWorkbook("empty payload".into()));
    }
    if data.starts_with(&CFB_MAGIC) {
        return Err(XlcountError::MalformedWorkbook(
            "unsupported format: OLE2 compound file (legacy .xls or encrypted workbook)".into(),
        ));
    }

    let mut archive = ZipArchive::new(Cursor::new(data)).or_malformed("opening package")?;

    let rels = parse_workbook_relationships(&mut archive)?;
    let info = parse_workbook_info(&mut archive, &rels.worksheets)?;
    if info.sheets.is_empty() {
        return Err(XlcountError::MalformedWorkbook(
            "workbook declares no sheets".into(),
        ));
    }

    let shared_strings = parse_shared_strings(&mut archive, rels.shared_strings.as_deref())?;
    let styles = parse_style_table(&mut archive, rels.styles.as_deref())?;

    let mut sheets = Vec::with_capacity(info.sheets.len());
    for sheet_info in info.sheets {
        let Some(xml) = read_part(&mut archive, &sheet_info.path)? else {
            return Err(XlcountError::MalformedWorkbook(format!(
                "worksheet part {} for sheet {:?} is missing",
                sheet_info.path, sheet_info.name
            )));
        };
        let sheet = parse_sheet(&xml, sheet_info, &shared_strings, &styles)?;
        tracing::debug!(
            sheet = %sheet.name,
            path = %sheet.path,
            cells = sheet.cells.len(),
            merges = sheet.merges.len(),
            "parsed worksheet"
        );
        sheets.push(sheet);
    }

    tracing::info!(
        sheets = sheets.len(),
        shared_strings = shared_strings.len(),
        bytes = data.len(),
        "workbook loaded"
    );

    Ok(Workbook {
        sheets,
        styles,
        defined_names: info.defined_names,
        date1904: info.date1904,
        source: data.to_vec(),
    })
}

/// Read a package part fully. `Ok(None)` when the part does not exist.
pub(crate) fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Option<Vec<u8>>> {
    let mut file = match archive.by_name(path) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(XlcountError::MalformedWorkbook(format!(
                "opening {path}: {e}"
            )))
        }
    };
    let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut data)
        .or_malformed(&format!("reading {path}"))?;
    Ok(Some(data))
}
