use serde::Serialize;
use std::fmt;

use crate::transform::{Operation, Percentage};

/// One rewritten traffic-count cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub sheet: String,
    /// A1-style address.
    pub address: String,
    pub original: f64,
    pub new: f64,
    pub operation: Operation,
    pub percentage: Percentage,
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}!{}: {} -> {} ({} {})",
            self.sheet, self.address, self.original, self.new, self.operation, self.percentage
        )
    }
}

/// Ordered audit trail of one invocation.
///
/// `lines` interleaves the rendered change records with summary and
/// skipped-column notices in the order they happened; `records` keeps the
/// structured changes only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeLog {
    records: Vec<ChangeRecord>,
    lines: Vec<String>,
}

impl ChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a free-form line (start/end summaries, skipped columns).
    pub fn note(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn record(&mut self, record: ChangeRecord) {
        self.lines.push(record.to_string());
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Display for ChangeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(line)?;
        }
        Ok(())
    }
}
