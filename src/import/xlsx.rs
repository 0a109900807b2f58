//! Spreadsheet files read through calamine (xlsx, xls, xlsb, ods).

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

use super::source::{RawValue, Sheet, TabularSource};
use crate::error::{Error, Result};

pub struct XlsxSource {
    workbook: Sheets<BufReader<File>>,
    path: PathBuf,
}

impl XlsxSource {
    pub fn open(path: &Path) -> Result<Self> {
        let workbook = open_workbook_auto(path).map_err(|e| {
            Error::SourceFormat(format!("failed to open {}: {}", path.display(), e))
        })?;
        Ok(Self {
            workbook,
            path: path.to_path_buf(),
        })
    }
}

impl TabularSource for XlsxSource {
    fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names().to_vec()
    }

    fn read_sheet(&mut self, name: &str) -> Result<Sheet> {
        let range = self.workbook.worksheet_range(name).map_err(|e| {
            Error::SourceFormat(format!("failed to read sheet '{}': {}", name, e))
        })?;
        let sheet = sheet_from_range(&range).ok_or_else(|| {
            Error::SourceFormat(format!("sheet '{}' has no header row", name))
        })?;
        debug!(
            "Read {} rows from sheet '{}' of {:?}",
            sheet.len(),
            name,
            self.path
        );
        Ok(sheet)
    }
}

/// First row of the range is the header; `None` when the range is empty.
fn sheet_from_range(range: &Range<Data>) -> Option<Sheet> {
    // Data may not begin at A1
    let (start_row, _) = range.start()?;
    let mut rows = range.rows();
    let headers = rows
        .next()?
        .iter()
        .map(|cell| raw_value(cell).to_text())
        .collect();
    let data = rows
        .map(|row| row.iter().map(raw_value).collect())
        .collect();

    Some(Sheet::new(headers, data).with_header_row(start_row as usize + 1))
}

fn raw_value(cell: &Data) -> RawValue {
    match cell {
        Data::Empty => RawValue::Empty,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Float(n) => RawValue::Float(*n),
        Data::Int(n) => RawValue::Int(*n),
        Data::Bool(b) => RawValue::Bool(*b),
        Data::Error(e) => RawValue::Error(format!("#{:?}", e)),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            serial_to_datetime(serial)
                .map(RawValue::DateTime)
                .unwrap_or(RawValue::Float(serial))
        }
        Data::DateTimeIso(s) => RawValue::Text(s.clone()),
        Data::DurationIso(s) => RawValue::Text(s.clone()),
    }
}

/// Convert an Excel serial date (1900 system) to a timestamp, rounded to the second.
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::seconds(seconds))
}
