//! xlcount - traffic-count XLSX transformer
//!
//! Scales the traffic-count cells of a workbook by a whole percentage and
//! returns a workbook that is otherwise untouched:
//! - Count columns are located from header labels and value shapes
//! - Only the `<v>` text of changed cells is rewritten
//! - Styles, merges, formulas, widths, heights and every other part are copied through
//!
//! # Usage (JavaScript)
//!
//! ```javascript
//! import init, { transform_xlsx } from 'xlcount';
//! await init();
//! const { file, log } = transform_xlsx(bytes, 13, "increase");
//! ```

pub mod cell_ref;
pub mod config;
pub mod error;
pub mod export;
pub mod locator;
pub mod numfmt;
pub mod parser;
pub mod transform;
pub mod types;
pub mod xml_helpers;

use wasm_bindgen::prelude::*;

pub use config::EngineConfig;
pub use error::XlcountError;
pub use locator::{ColumnRole, Locator, WorkbookClassification};
pub use transform::{Operation, Percentage, TransformRequest};
pub use types::*;

/// Result of a successful [`transform_workbook`] call.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// The transformed XLSX package.
    pub bytes: Vec<u8>,
    pub log: ChangeLog,
}

/// Load, classify, transform and re-encode a workbook.
///
/// Nothing is returned on failure; partial output is never produced.
///
/// # Errors
/// `InvalidConfig` for unusable locator settings, `MalformedWorkbook` when the
/// input cannot be read, `NoTransformableCells` when no column looks like a
/// traffic count, `Serialization` when the output cannot be written.
pub fn transform_workbook(
    data: &[u8],
    request: &TransformRequest,
    config: &EngineConfig,
) -> error::Result<TransformOutput> {
    let (workbook, log) = preview_transform(data, request, config)?;
    let bytes = export::save(&workbook, &config.save)?;

    tracing::info!(
        modified = log.len(),
        output_bytes = bytes.len(),
        "transform complete"
    );
    Ok(TransformOutput { bytes, log })
}

/// Run every stage except serialization.
///
/// Returns the mutated workbook (dirty cells marked) and the change log.
///
/// # Errors
/// As [`transform_workbook`], minus `Serialization`.
#[tracing::instrument(
    level = "info",
    skip_all,
    fields(bytes = data.len(), operation = %request.operation, percentage = %request.percentage)
)]
pub fn preview_transform(
    data: &[u8],
    request: &TransformRequest,
    config: &EngineConfig,
) -> error::Result<(Workbook, ChangeLog)> {
    let locator = Locator::new(&config.locator)?;
    let mut workbook = parser::load(data)?;

    let plan = locator.classify_workbook(&workbook);

    let mut log = ChangeLog::new();
    log.note(format!(
        "Processing {} sheet(s): {} {}",
        plan.sheets.len(),
        request.operation,
        request.percentage
    ));
    for name in &plan.missing_sheets {
        log.note(format!("Sheet not found: {name}"));
    }
    for sheet in &plan.sheets {
        for column in sheet.skipped() {
            tracing::warn!(
                sheet = %sheet.sheet_name,
                column = %column.letter,
                role = %column.role,
                "column left untouched"
            );
            log.note(format!(
                "Skipped column {} in {}: {}",
                column.letter, sheet.sheet_name, column.role
            ));
        }
    }

    if plan.count_cells() == 0 {
        tracing::warn!(sheets = plan.sheets.len(), "no traffic-count cells found");
        return Err(XlcountError::NoTransformableCells {
            sheets_scanned: plan.sheets.len(),
        });
    }

    transform::apply(&mut workbook, &plan, request, &config.transform, &mut log);
    Ok((workbook, log))
}

/// Load a workbook and report the role assigned to every column.
///
/// # Errors
/// `InvalidConfig` or `MalformedWorkbook`.
pub fn classify_workbook(data: &[u8], config: &EngineConfig) -> error::Result<WorkbookClassification> {
    let locator = Locator::new(&config.locator)?;
    let workbook = parser::load(data)?;
    Ok(locator.classify_workbook(&workbook))
}

/// Transform an XLSX file in the browser.
///
/// Returns `{ file: Uint8Array, log: string[] }`.
///
/// # Errors
/// Returns the error message if the request or the workbook is invalid.
#[wasm_bindgen]
pub fn transform_xlsx(data: &[u8], percentage: u32, operation: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let percentage = Percentage::new(percentage)?;
    let operation: Operation = operation.parse()?;
    let output = transform_workbook(
        data,
        &TransformRequest::new(operation, percentage),
        &EngineConfig::default(),
    )?;

    let log = serde_wasm_bindgen::to_value(output.log.lines())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))?;
    let result = js_sys::Object::new();
    js_sys::Reflect::set(
        &result,
        &JsValue::from_str("file"),
        &js_sys::Uint8Array::from(output.bytes.as_slice()),
    )?;
    js_sys::Reflect::set(&result, &JsValue::from_str("log"), &log)?;
    Ok(result.into())
}

/// Classify the columns of an XLSX file and return the result as a `JsValue`.
///
/// # Errors
/// Returns an error if the XLSX file is invalid or cannot be parsed.
#[wasm_bindgen]
pub fn classify_xlsx(data: &[u8]) -> Result<JsValue, JsValue> {
    let classification = classify_workbook(data, &EngineConfig::default())?;
    serde_wasm_bindgen::to_value(&classification)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
}

/// Get the library version
#[must_use]
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
