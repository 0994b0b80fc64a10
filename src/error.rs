//! Structured error types for xlcount.
//!
//! Every engine failure is local to one invocation and maps onto one of the
//! kinds below. Stage-specific failures from `zip`/`quick-xml` are folded into
//! the kind of the stage that hit them (loading vs. re-encoding).

use std::fmt::Display;

/// All errors that can occur while transforming a workbook.
#[derive(Debug, thiserror::Error)]
pub enum XlcountError {
    /// Input bytes are not a readable XLSX workbook.
    #[error("Malformed workbook: {0}")]
    MalformedWorkbook(String),

    /// Percentage outside `1..=100` or not a whole number.
    #[error("Invalid percentage {0:?}: expected a whole number from 1 to 100")]
    InvalidPercentage(String),

    /// Operation other than `increase`/`decrease`.
    #[error("Invalid operation {0:?}: expected \"increase\" or \"decrease\"")]
    InvalidOperation(String),

    /// The classifier found no traffic-count cells anywhere in the workbook.
    #[error(
        "No traffic-count cells found in {sheets_scanned} sheet(s); \
         the workbook layout does not look like a traffic count"
    )]
    NoTransformableCells { sheets_scanned: usize },

    /// Re-encoding the mutated workbook failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Locator/engine configuration could not be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, XlcountError>;

impl XlcountError {
    /// Stable snake_case code for boundary layers (JSON responses, exit reporting).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedWorkbook(_) => "malformed_workbook",
            Self::InvalidPercentage(_) => "invalid_percentage",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::NoTransformableCells { .. } => "no_transformable_cells",
            Self::Serialization(_) => "serialization",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Warning-level failures: the input was valid but did not match the
    /// expected traffic-count structure.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::NoTransformableCells { .. })
    }
}

/// Attach stage context to foreign errors.
pub(crate) trait ResultExt<T> {
    /// Treat the failure as a loader error.
    fn or_malformed(self, context: &str) -> Result<T>;
    /// Treat the failure as a serializer error.
    fn or_serialization(self, context: &str) -> Result<T>;
}

impl<T, E: Display> ResultExt<T> for std::result::Result<T, E> {
    fn or_malformed(self, context: &str) -> Result<T> {
        self.map_err(|e| XlcountError::MalformedWorkbook(format!("{context}: {e}")))
    }

    fn or_serialization(self, context: &str) -> Result<T> {
        self.map_err(|e| XlcountError::Serialization(format!("{context}: {e}")))
    }
}

impl From<XlcountError> for wasm_bindgen::JsValue {
    fn from(e: XlcountError) -> Self {
        wasm_bindgen::JsValue::from_str(&e.to_string())
    }
}
