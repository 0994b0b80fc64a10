//! Data types for the workbook model and the change log.

mod cell;
mod change;
mod workbook;

pub use cell::*;
pub use change::*;
pub use workbook::*;
