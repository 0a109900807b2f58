//! Tabular input abstraction: named sheets of header-keyed rows.

use chrono::{NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};

/// A single cell as read from a spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    /// Formula error such as `#N/A`.
    Error(String),
}

static EMPTY: RawValue = RawValue::Empty;

impl RawValue {
    /// True for cells that carry no usable value: blank, empty text or an error.
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Empty | RawValue::Error(_) => true,
            RawValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Render the cell as stored text. Missing cells become the empty string.
    pub fn to_text(&self) -> String {
        match self {
            RawValue::Empty | RawValue::Error(_) => String::new(),
            RawValue::Text(s) => s.clone(),
            RawValue::Int(n) => n.to_string(),
            RawValue::Float(n) => {
                // Whole numbers print without a decimal point
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            RawValue::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            RawValue::DateTime(dt) => {
                if dt.time() == NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        RawValue::Int(n)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Float(n)
    }
}

/// One sheet: a header row followed by data rows.
#[derive(Debug, Clone)]
pub struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<RawValue>>,
    /// 1-based sheet row of the header, used to number data rows.
    header_row: usize,
}

impl Sheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<RawValue>>) -> Self {
        Self {
            headers,
            rows,
            header_row: 1,
        }
    }

    pub(crate) fn with_header_row(mut self, header_row: usize) -> Self {
        self.header_row = header_row;
        self
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Index of the column whose header matches `header` exactly.
    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = SourceRow<'_>> {
        let first = self.header_row + 1;
        self.rows.iter().enumerate().map(move |(i, cells)| SourceRow {
            number: first + i,
            cells,
        })
    }
}

/// A data row borrowed from a [`Sheet`].
#[derive(Debug, Clone, Copy)]
pub struct SourceRow<'a> {
    /// 1-based row number in the sheet, as a spreadsheet user would see it.
    pub number: usize,
    cells: &'a [RawValue],
}

impl<'a> SourceRow<'a> {
    /// Cell in column `idx`; absent columns and short rows read as empty.
    pub fn get(&self, idx: Option<usize>) -> &'a RawValue {
        idx.and_then(|i| self.cells.get(i)).unwrap_or(&EMPTY)
    }
}

/// Anything that can hand over named sheets of rows.
pub trait TabularSource {
    fn sheet_names(&self) -> Vec<String>;

    fn read_sheet(&mut self, name: &str) -> Result<Sheet>;
}

/// Sheets held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    sheets: Vec<(String, Sheet)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, name: impl Into<String>, sheet: Sheet) -> Self {
        self.sheets.push((name.into(), sheet));
        self
    }
}

impl TabularSource for MemorySource {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.clone()).collect()
    }

    fn read_sheet(&mut self, name: &str) -> Result<Sheet> {
        self.sheets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, sheet)| sheet.clone())
            .ok_or_else(|| Error::SourceFormat(format!("sheet '{}' not found", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_missing_values() {
        assert!(RawValue::Empty.is_missing());
        assert!(RawValue::Text(String::new()).is_missing());
        assert!(RawValue::Error("NA".to_string()).is_missing());
        assert!(!RawValue::Text(" ".to_string()).is_missing());
        assert!(!RawValue::Int(0).is_missing());
    }

    #[test]
    fn test_text_rendering() {
        assert_eq!(RawValue::Float(5.0).to_text(), "5");
        assert_eq!(RawValue::Float(2.5).to_text(), "2.5");
        assert_eq!(RawValue::Int(12).to_text(), "12");
        assert_eq!(RawValue::Bool(true).to_text(), "TRUE");

        let date = NaiveDate::from_ymd_opt(2012, 4, 9).unwrap();
        assert_eq!(
            RawValue::DateTime(date.and_hms_opt(0, 0, 0).unwrap()).to_text(),
            "2012-04-09"
        );
        assert_eq!(
            RawValue::DateTime(date.and_hms_opt(14, 30, 0).unwrap()).to_text(),
            "2012-04-09 14:30:00"
        );
    }

    #[test]
    fn test_rows_are_numbered_and_padded() {
        let sheet = Sheet::new(
            vec!["Name".to_string(), "Grade".to_string()],
            vec![vec!["Sam".into(), 5i64.into()], vec!["Ann".into()]],
        );
        let rows: Vec<_> = sheet.rows().collect();
        assert_eq!(rows[0].number, 2);
        assert_eq!(rows[1].number, 3);
        assert_eq!(rows[1].get(sheet.column("Grade")), &RawValue::Empty);
        assert_eq!(rows[0].get(sheet.column("Missing")), &RawValue::Empty);
    }

    #[test]
    fn test_memory_source_missing_sheet() {
        let mut source = MemorySource::new().with_sheet("Other", Sheet::new(Vec::new(), Vec::new()));
        assert_eq!(source.sheet_names(), vec!["Other"]);
        assert!(matches!(
            source.read_sheet("All Kids"),
            Err(Error::SourceFormat(_))
        ));
    }
}
