//! Pre-published table of standard normal deviates, one column per seed.
//!
//! Column headers are seed numbers; row `i` holds the deviate for the course whose id is
//! `i + start_of_index`. Non-numeric header cells (e.g. a spreadsheet index column) are skipped.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::Path;

use tracing::info;

use crate::data::catalog::extension;
use crate::data::sheet::{read_first_sheet, SheetRows};
use crate::error::{DataError, PriceError};
use crate::pricing::rng::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct ZScoreTable {
    columns: HashMap<u64, Vec<f64>>,
    rows: usize,
}

impl ZScoreTable {
    /// Every column must have the same length.
    pub fn from_columns<I>(columns: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (u64, Vec<f64>)>,
    {
        let columns: HashMap<u64, Vec<f64>> = columns.into_iter().collect();
        let rows = columns.values().map(Vec::len).next().unwrap_or(0);
        if let Some((seed, column)) = columns.iter().find(|(_, column)| column.len() != rows) {
            return Err(DataError::InvalidRecord {
                row: column.len(),
                message: format!("seed column {seed} has {} rows, expected {rows}", column.len()),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn load(path: &Path) -> Result<Self, DataError> {
        let table = match extension(path).as_deref() {
            Some("csv") => {
                let raw = fs::read_to_string(path).map_err(|source| DataError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::parse_csv(raw.as_bytes())?
            }
            Some("xlsx" | "xlsm" | "xls" | "ods") => {
                let mut workbook = calamine::open_workbook_auto(path)
                    .map_err(|err| DataError::Xlsx(err.to_string()))?;
                Self::from_sheet(read_first_sheet(&mut workbook)?)?
            }
            _ => return Err(DataError::UnsupportedFormat(path.to_path_buf())),
        };
        info!(
            path = %path.display(),
            seeds = table.columns.len(),
            rows = table.rows,
            "loaded z-score table"
        );
        Ok(table)
    }

    pub fn parse_csv<R: std::io::Read>(reader: R) -> Result<Self, DataError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Self::from_sheet(SheetRows { headers, rows })
    }

    fn from_sheet(sheet: SheetRows) -> Result<Self, DataError> {
        let seed_columns: Vec<(usize, u64)> = sheet
            .headers
            .iter()
            .enumerate()
            .filter_map(|(idx, header)| parse_seed_header(header).map(|seed| (idx, seed)))
            .collect();
        if seed_columns.is_empty() {
            return Err(DataError::InvalidRecord {
                row: 1,
                message: "z-score table has no numeric seed columns".to_string(),
            });
        }

        let mut columns: Vec<(u64, Vec<f64>)> = seed_columns
            .iter()
            .map(|&(_, seed)| (seed, Vec::with_capacity(sheet.rows.len())))
            .collect();
        for (row_idx, row) in sheet.rows.iter().enumerate() {
            for (slot, &(col_idx, seed)) in seed_columns.iter().enumerate() {
                let raw = row.get(col_idx).map(String::as_str).unwrap_or("");
                let value: f64 = raw.trim().parse().map_err(|_| DataError::InvalidRecord {
                    row: row_idx + 2,
                    message: format!("seed {seed}: '{raw}' is not a number"),
                })?;
                columns[slot].1.push(value);
            }
        }
        Self::from_columns(columns)
    }

    /// Deterministic table of `rows` deviates for every seed in `seeds`.
    /// The same `(seed, row, salt)` always yields the same value.
    pub fn synthetic(seeds: RangeInclusive<u64>, rows: usize, salt: u64) -> Self {
        let columns = seeds
            .map(|seed| {
                let mut rng = Rng::new(seed ^ salt.rotate_left(32));
                let column = (0..rows).map(|_| rng.next_standard_normal()).collect();
                (seed, column)
            })
            .collect();
        Self { columns, rows }
    }

    /// The deviate for `seed` at zero-based row `index`.
    pub fn deviate(&self, seed: u64, index: i64) -> Result<f64, PriceError> {
        let column = self
            .columns
            .get(&seed)
            .ok_or(PriceError::UnknownSeed { seed })?;
        usize::try_from(index)
            .ok()
            .and_then(|idx| column.get(idx).copied())
            .ok_or(PriceError::IndexOutOfRange {
                index,
                rows: self.rows,
            })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn contains_seed(&self, seed: u64) -> bool {
        self.columns.contains_key(&seed)
    }

    /// Seeds in ascending order.
    pub fn seeds(&self) -> Vec<u64> {
        let mut seeds: Vec<u64> = self.columns.keys().copied().collect();
        seeds.sort_unstable();
        seeds
    }

    /// Write as CSV with an ascending seed header.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), DataError> {
        let ordered: BTreeMap<u64, &Vec<f64>> =
            self.columns.iter().map(|(seed, col)| (*seed, col)).collect();
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(ordered.keys().map(|seed| seed.to_string()))?;
        for row in 0..self.rows {
            out.write_record(ordered.values().map(|col| format!("{:.6}", col[row])))?;
        }
        out.flush().map_err(|source| DataError::Io {
            path: "<csv writer>".into(),
            source,
        })?;
        Ok(())
    }
}

fn parse_seed_header(header: &str) -> Option<u64> {
    let header = header.trim();
    header.parse::<u64>().ok().or_else(|| {
        header
            .parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0)
            .map(|f| f as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "index,1,2,3\n0,0.5,-1.0,2.0\n1,1.5,0.25,-0.75\n";

    #[test]
    fn csv_columns_are_keyed_by_seed() {
        let table = ZScoreTable::parse_csv(CSV.as_bytes()).unwrap();
        assert_eq!(table.seeds(), vec![1, 2, 3]);
        assert_eq!(table.rows(), 2);
        assert_eq!(table.deviate(2, 1).unwrap(), 0.25);
    }

    #[test]
    fn unknown_seed_and_bad_index_are_distinct_errors() {
        let table = ZScoreTable::parse_csv(CSV.as_bytes()).unwrap();
        assert_eq!(
            table.deviate(9, 0),
            Err(PriceError::UnknownSeed { seed: 9 })
        );
        assert_eq!(
            table.deviate(1, 2),
            Err(PriceError::IndexOutOfRange { index: 2, rows: 2 })
        );
        assert_eq!(
            table.deviate(1, -1),
            Err(PriceError::IndexOutOfRange { index: -1, rows: 2 })
        );
    }

    #[test]
    fn non_numeric_cell_is_rejected() {
        let err = ZScoreTable::parse_csv("1\nabc\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::InvalidRecord { row: 2, .. }));
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let err = ZScoreTable::from_columns([(1, vec![0.0, 1.0]), (2, vec![0.0])]).unwrap_err();
        assert!(matches!(err, DataError::InvalidRecord { .. }));
    }

    #[test]
    fn synthetic_table_is_reproducible_and_survives_csv_round_trip() {
        let a = ZScoreTable::synthetic(1..=4, 16, 7);
        let b = ZScoreTable::synthetic(1..=4, 16, 7);
        assert_eq!(a, b);
        assert_ne!(a.deviate(1, 0).unwrap(), a.deviate(2, 0).unwrap());

        let mut buffer = Vec::new();
        a.write_csv(&mut buffer).unwrap();
        let reloaded = ZScoreTable::parse_csv(buffer.as_slice()).unwrap();
        assert_eq!(reloaded.seeds(), vec![1, 2, 3, 4]);
        assert!((reloaded.deviate(3, 15).unwrap() - a.deviate(3, 15).unwrap()).abs() < 1e-6);
    }

    #[test]
    fn spreadsheet_float_headers_count_as_seeds() {
        assert_eq!(parse_seed_header("12.0"), Some(12));
        assert_eq!(parse_seed_header("Unnamed: 0"), None);
    }
}
