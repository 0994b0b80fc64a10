//! Utilities for Excel-style cell references and ranges.

/// Parse a cell reference like "A1" into (col, row) where col and row are 0-indexed.
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    parse_cell_ref_bytes(cell_ref.trim().as_bytes())
}

/// Parse a cell reference from raw bytes (ASCII) into (col, row), 0-indexed.
///
/// This is the bytes equivalent of [`parse_cell_ref`] for raw XML attribute values.
/// Letters must precede digits; anything else is rejected.
pub fn parse_cell_ref_bytes(ref_bytes: &[u8]) -> Option<(u32, u32)> {
    let mut col: u32 = 0;
    let mut row: u32 = 0;
    let mut saw_col = false;
    let mut saw_row = false;

    for &b in ref_bytes {
        if b == b'$' {
            continue;
        }
        if b.is_ascii_alphabetic() && !saw_row {
            let upper = b.to_ascii_uppercase();
            col = col
                .checked_mul(26)?
                .checked_add(u32::from(upper - b'A') + 1)?;
            saw_col = true;
        } else if b.is_ascii_digit() && saw_col {
            row = row.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
            saw_row = true;
        } else {
            return None;
        }
    }

    if !saw_col || !saw_row || row == 0 {
        return None;
    }

    Some((col - 1, row - 1))
}

/// Parse a cell range like "A1:B10" or "A1" into (start_row, start_col, end_row, end_col).
pub fn parse_cell_range(range: &str) -> Option<(u32, u32, u32, u32)> {
    if let Some((start, end)) = range.split_once(':') {
        let (start_col, start_row) = parse_cell_ref(start)?;
        let (end_col, end_row) = parse_cell_ref(end)?;
        Some((
            start_row.min(end_row),
            start_col.min(end_col),
            start_row.max(end_row),
            start_col.max(end_col),
        ))
    } else {
        let (start_col, start_row) = parse_cell_ref(range)?;
        Some((start_row, start_col, start_row, start_col))
    }
}

/// Convert a 0-based column index to Excel column letters (A, B, ..., Z, AA, AB, ...)
pub fn col_to_letter(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = u64::from(col) + 1;
    while n > 0 {
        n -= 1;
        letters.push(b'A' + u8::try_from(n % 26).unwrap_or(0));
        n /= 26;
    }
    letters.iter().rev().map(|&b| char::from(b)).collect()
}

/// Format a 0-indexed (row, col) as an A1-style address.
pub fn cell_address(row: u32, col: u32) -> String {
    format!("{}{}", col_to_letter(col), u64::from(row) + 1)
}
