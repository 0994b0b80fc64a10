//! Patch an XLSX ZIP archive with modified sheet XML.
//!
//! Unmodified entries are copied via `raw_copy_file` (zero recompression cost).
//! Only dirty sheets, and the workbook part when recalculation is forced, are
//! rewritten.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Seek, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::SaveOptions;
use crate::error::{Result, ResultExt, XlcountError};
use crate::types::{Sheet, Workbook};

use super::recalc::force_full_calc_on_load;
use super::sheet_writer::patch_sheet_xml;

const WORKBOOK_PART: &str = "xl/workbook.xml";

/// Rebuild the package from `workbook.source()`, entry order unchanged.
pub(crate) fn patch_zip(workbook: &Workbook, options: &SaveOptions) -> Result<Vec<u8>> {
    let original_data = workbook.source();
    let mut archive =
        ZipArchive::new(Cursor::new(original_data)).or_serialization("reopening source package")?;

    let dirty: HashMap<&str, &Sheet> = workbook
        .dirty_sheets()
        .map(|sheet| (sheet.path.as_str(), sheet))
        .collect();
    let mut written: HashSet<&str> = HashSet::new();

    let buf: Vec<u8> = Vec::with_capacity(original_data.len());
    let mut writer = ZipWriter::new(Cursor::new(buf));

    for i in 0..archive.len() {
        let name = archive
            .by_index_raw(i)
            .or_serialization("reading package entry")?
            .name()
            .to_string();

        let replacement = if let Some((&path, sheet)) = dirty.get_key_value(name.as_str()) {
            written.insert(path);
            Some(patch_sheet_xml(&read_entry(&mut archive, i, &name)?, sheet)?)
        } else if options.force_full_calc_on_load && name == WORKBOOK_PART {
            Some(force_full_calc_on_load(&read_entry(&mut archive, i, &name)?)?)
        } else {
            None
        };

        let entry = archive
            .by_index_raw(i)
            .or_serialization("reading package entry")?;
        match replacement {
            Some(xml) => {
                let file_options = FileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .last_modified_time(entry.last_modified());
                drop(entry);
                writer
                    .start_file(name.as_str(), file_options)
                    .or_serialization(&format!("writing {name}"))?;
                writer
                    .write_all(&xml)
                    .or_serialization(&format!("writing {name}"))?;
                tracing::debug!(part = %name, bytes = xml.len(), "rewrote package part");
            }
            None => {
                // Pass through unmodified entry (raw copy, no re-compression)
                writer
                    .raw_copy_file(entry)
                    .or_serialization(&format!("copying {name}"))?;
            }
        }
    }

    if let Some(sheet) = dirty.values().find(|s| !written.contains(s.path.as_str())) {
        return Err(XlcountError::Serialization(format!(
            "worksheet part {} for sheet {:?} is missing from the package",
            sheet.path, sheet.name
        )));
    }

    let cursor = writer.finish().or_serialization("finishing package")?;
    Ok(cursor.into_inner())
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize, name: &str) -> Result<Vec<u8>> {
    let mut file = archive
        .by_index(index)
        .or_serialization(&format!("opening {name}"))?;
    let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut data)
        .or_serialization(&format!("reading {name}"))?;
    Ok(data)
}
