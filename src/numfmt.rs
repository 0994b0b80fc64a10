//! Number format inspection.
//!
//! Only one question matters to the count locator: does a cell's number
//! format render its serial value as a date or time?

/// Built-in number format IDs that Excel renders as dates/times.
/// See: ECMA-376 Part 1, Section 18.8.30
pub const fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// Check if a custom format code is a date/time format.
///
/// Quoted literals, bracketed sections (colors, conditions, locales) and
/// escaped characters are ignored before looking for date/time tokens.
pub fn is_date_format(format_code: &str) -> bool {
    let lower = format_code.to_lowercase();
    if lower == "general" {
        return false;
    }

    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;
    let mut cleaned = String::new();
    let mut bracket = String::new();
    let mut elapsed = false;

    for c in lower.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if !in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => {
                in_brackets = true;
                bracket.clear();
            }
            ']' if !in_quotes && in_brackets => {
                in_brackets = false;
                // [h], [mm], [ss] are elapsed-time tokens; [Magenta] is a color.
                elapsed |= !bracket.is_empty() && bracket.chars().all(|b| matches!(b, 'h' | 'm' | 's'));
            }
            _ if in_brackets => bracket.push(c),
            _ if !in_quotes && !in_brackets => cleaned.push(c),
            _ => {}
        }
    }

    // Only the first (positive) section decides.
    let first = cleaned.split(';').next().unwrap_or("");

    elapsed
        || first.contains('y')
        || first.contains('d')
        || first.contains('h')
        || (first.contains('m') && !first.contains('#') && !first.contains('0'))
        || (first.contains('s') && first.contains(':'))
}
