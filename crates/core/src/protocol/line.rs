//! Pure per-line parsers for the three wire encodings
//!
//! - Simple: `X<col>Y<row>:<value>`, one point per line
//! - Table: header `X0,X1,...,X15`, then `Y<row>,<v0>,...,<v15>`
//! - Legacy: `Row<NN> v0 v1 ... v15` (space or colon separated), sent
//!   outside any START/END block by older firmware
//!
//! Malformed cells are skipped, never fatal: a bad value discards that
//! cell and parsing continues with the rest of the line.

use crate::MATRIX_DIM;

/// A single (row, col) -> value update extracted from a data line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointUpdate {
    pub row: usize,
    pub col: usize,
    pub value: i64,
}

/// Outcome of payload-format detection on a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Valid 16-column table header
    TableHeader(Vec<usize>),
    /// First simple-format data line
    Simple,
    /// Nothing recognizable yet
    None,
}

/// Detect the payload encoding from one line.
///
/// A header whose column count is anything but 16 resolves to `None`,
/// leaving the format undetected for the rest of the frame.
pub fn detect_format(line: &str) -> Detection {
    if line.starts_with('X') && line.contains(',') {
        match parse_table_header(line) {
            Some(columns) => Detection::TableHeader(columns),
            None => Detection::None,
        }
    } else if line.contains('X') && line.contains('Y') && line.contains(':') {
        Detection::Simple
    } else {
        Detection::None
    }
}

/// Parse a table header `X0,X1,...,X15` into its declared column order.
///
/// Tokens that are not `X<n>` with n in range are skipped; the result is
/// only accepted when exactly 16 columns survive.
pub fn parse_table_header(line: &str) -> Option<Vec<usize>> {
    let mut columns = Vec::with_capacity(MATRIX_DIM);
    for token in line.split(',') {
        let Some(digits) = token.trim().strip_prefix('X') else {
            continue;
        };
        if let Ok(col) = digits.parse::<usize>() {
            if col < MATRIX_DIM {
                columns.push(col);
            }
        }
    }
    (columns.len() == MATRIX_DIM).then_some(columns)
}

/// Parse a table data line `Y<row>,<v0>,<v1>,...` against the header's
/// column order. Non-integer cells are skipped per-cell.
pub fn parse_table_row(line: &str, columns: &[usize]) -> Vec<PointUpdate> {
    let mut parts = line.split(',');
    let Some(row_token) = parts.next() else {
        return Vec::new();
    };
    let Some(digits) = row_token.trim().strip_prefix('Y') else {
        return Vec::new();
    };
    let Ok(row) = digits.parse::<usize>() else {
        return Vec::new();
    };
    if row >= MATRIX_DIM {
        return Vec::new();
    }

    let mut updates = Vec::new();
    for (idx, token) in parts.take(MATRIX_DIM).enumerate() {
        let Some(&col) = columns.get(idx) else {
            break;
        };
        if let Ok(value) = token.trim().parse::<i64>() {
            updates.push(PointUpdate { row, col, value });
        }
    }
    updates
}

/// Parse a simple-format line `X<col>Y<row>:<value>`.
///
/// Returns `None` for anything malformed or out of range.
pub fn parse_simple(line: &str) -> Option<PointUpdate> {
    let (coord, value_str) = line.split_once(':')?;
    let rest = coord.trim().strip_prefix('X')?;
    let (col_str, row_str) = rest.split_once('Y')?;
    let col = col_str.parse::<usize>().ok()?;
    let row = row_str.parse::<usize>().ok()?;
    let value = value_str.trim().parse::<i64>().ok()?;
    (row < MATRIX_DIM && col < MATRIX_DIM).then_some(PointUpdate { row, col, value })
}

/// Parse a legacy whole-row line `Row<NN> v0 v1 ... v15`.
///
/// The separator after the row label is a space or a colon. Decorative
/// table output (`Row\Col` headers and the like) is rejected outright.
pub fn parse_legacy_row(line: &str) -> Vec<PointUpdate> {
    if !line.starts_with("Row") || line.contains("Row\\Col") || line.contains("Capacitance Matrix")
    {
        return Vec::new();
    }
    let cleaned = line.replace(':', " ");
    let mut parts = cleaned.split_whitespace();
    let Some(row_token) = parts.next() else {
        return Vec::new();
    };
    let Ok(row) = row_token[3..].parse::<usize>() else {
        return Vec::new();
    };
    if row >= MATRIX_DIM {
        return Vec::new();
    }

    let mut updates = Vec::new();
    for (col, token) in parts.take(MATRIX_DIM).enumerate() {
        if let Ok(value) = token.parse::<i64>() {
            updates.push(PointUpdate { row, col, value });
        }
    }
    updates
}
