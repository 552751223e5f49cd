//! Spreadsheet helpers: flatten the first worksheet of a workbook into text cells.

use std::io::{Read, Seek};

use calamine::{Data, Reader, Sheets};

use crate::error::DataError;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Header row plus data rows, every cell rendered as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRows {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn read_first_sheet<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
) -> Result<SheetRows, DataError> {
    let names = workbook.sheet_names();
    let first = names
        .first()
        .ok_or_else(|| DataError::Xlsx("workbook has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(first)
        .map_err(|err| DataError::Xlsx(err.to_string()))?;

    let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows
        .next()
        .ok_or_else(|| DataError::Xlsx(format!("sheet '{first}' is empty")))?
        .into_iter()
        .map(|header| header.trim().to_string())
        .collect();

    Ok(SheetRows {
        headers,
        rows: rows.collect(),
    })
}

/// Render one cell as text. Whole floats print without a fraction so ids survive, and
/// spreadsheet times (fractions of a day) print as `HH:MM:SS`.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => format!("{f}"),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => day_fraction_to_clock(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => match s.split_once('T') {
            Some((_, time)) => time.to_string(),
            None => s.clone(),
        },
        #[allow(unreachable_patterns)]
        other => format!("{other:?}"),
    }
}

fn day_fraction_to_clock(value: f64) -> String {
    let seconds = (value.fract().abs() * SECONDS_PER_DAY).round() as u64 % 86_400;
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
