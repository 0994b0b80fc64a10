//! XLSX export pipeline.
//!
//! Produces a modified XLSX by patching the original ZIP archive.
//! Only dirty (edited) sheets are re-serialized; everything else is
//! passed through byte-identical.

mod recalc;
pub(crate) mod sheet_writer;
pub(crate) mod zip_patcher;

use crate::cell_ref::cell_address;
use crate::config::SaveOptions;
use crate::error::{Result, XlcountError};
use crate::parser;
use crate::types::Workbook;

/// Save a workbook to XLSX bytes.
///
/// With nothing to change the original bytes are returned as-is.
///
/// # Errors
/// `Serialization` when a changed cell cannot be written back, the package
/// cannot be rebuilt, or (with `verify_round_trip`) the output does not
/// reload with the changed values.
pub fn save(workbook: &Workbook, options: &SaveOptions) -> Result<Vec<u8>> {
    if !workbook.is_dirty() && !options.force_full_calc_on_load {
        // Nothing changed, return the original bytes
        return Ok(workbook.source().to_vec());
    }

    let bytes = zip_patcher::patch_zip(workbook, options).map_err(|e| {
        tracing::error!(error = %e, "failed to rebuild workbook package");
        e
    })?;

    if options.verify_round_trip {
        verify(workbook, &bytes).map_err(|e| {
            tracing::error!(error = %e, "round-trip verification failed");
            e
        })?;
    }

    tracing::info!(
        bytes = bytes.len(),
        sheets_rewritten = workbook.dirty_sheets().count(),
        "workbook saved"
    );
    Ok(bytes)
}

/// Reload `bytes` and check every changed cell reads back with its new value.
fn verify(workbook: &Workbook, bytes: &[u8]) -> Result<()> {
    let reloaded = parser::load(bytes)
        .map_err(|e| XlcountError::Serialization(format!("output does not reload: {e}")))?;

    if reloaded.sheets.len() != workbook.sheets.len() {
        return Err(XlcountError::Serialization(format!(
            "output has {} sheets, expected {}",
            reloaded.sheets.len(),
            workbook.sheets.len()
        )));
    }

    for (sheet, copy) in workbook.dirty_sheets().filter_map(|s| {
        reloaded.sheet(&s.name).map(|copy| (s, copy))
    }) {
        for (row, col) in sheet.dirty_cells() {
            let expected = sheet.value_at(row, col).as_number().map(|n| n.to_string());
            let actual = copy.value_at(row, col).as_number().map(|n| n.to_string());
            if expected != actual {
                return Err(XlcountError::Serialization(format!(
                    "{}!{}: reloaded value {actual:?} differs from {expected:?}",
                    sheet.name,
                    cell_address(row, col)
                )));
            }
        }
    }

    Ok(())
}
