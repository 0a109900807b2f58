//! Fixed layout of the roster sheet and typed row mapping.

use tracing::warn;

use super::source::{RawValue, Sheet, SourceRow};
use crate::db::StudentFields;
use crate::error::{Error, Result};

/// Sheet holding the roster, on import and export.
pub const SHEET_NAME: &str = "All Kids";

/// Student id column written by the exporter. Optional on import.
pub const ID: &str = "ID";

pub const NAME: &str = "Name";
pub const GRADE: &str = "Grade";
pub const GENDER: &str = "Gen";
pub const SERVANT: &str = "Servant";
pub const PHONE: &str = "Phone number";
pub const PARENT_PHONE: &str = "Parent Phone";
pub const DOB: &str = "DOB";
pub const ADDRESS: &str = "Address ";
pub const COMMENTS: &str = "Comments";
pub const PICTURES: &str = "Pictures";
pub const LAST_CALL: &str = "Last Call/Visitation ";

/// Roster headers in sheet order. Note the trailing spaces on two of them.
pub const HEADERS: [&str; 11] = [
    NAME,
    GRADE,
    GENDER,
    SERVANT,
    PHONE,
    PARENT_PHONE,
    DOB,
    ADDRESS,
    COMMENTS,
    PICTURES,
    LAST_CALL,
];

/// A named roster row, with the store id when the sheet carries one.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RosterRow {
    pub id: Option<i64>,
    pub fields: StudentFields,
}

/// Column positions of one sheet, resolved once before the rows are mapped.
#[derive(Debug, Clone)]
pub(crate) struct ColumnMap {
    id: Option<usize>,
    name: usize,
    grade: Option<usize>,
    gender: Option<usize>,
    servant: Option<usize>,
    phone: Option<usize>,
    parent_phone: Option<usize>,
    dob: Option<usize>,
    address: Option<usize>,
    comments: Option<usize>,
    pictures: Option<usize>,
    last_call: Option<usize>,
}

impl ColumnMap {
    pub(crate) fn locate(sheet: &Sheet) -> Result<Self> {
        let name = sheet.column(NAME).ok_or_else(|| {
            Error::SourceFormat(format!("sheet '{}' has no '{}' column", SHEET_NAME, NAME))
        })?;

        let optional = |header: &str| {
            let idx = sheet.column(header);
            if idx.is_none() {
                warn!("Column {:?} not found, every row gets the default", header);
            }
            idx
        };

        Ok(Self {
            id: sheet.column(ID),
            name,
            grade: optional(GRADE),
            gender: optional(GENDER),
            servant: optional(SERVANT),
            phone: optional(PHONE),
            parent_phone: optional(PARENT_PHONE),
            dob: optional(DOB),
            address: optional(ADDRESS),
            comments: optional(COMMENTS),
            pictures: optional(PICTURES),
            last_call: optional(LAST_CALL),
        })
    }

    /// Map a row to student fields. `Ok(None)` when the row has no name.
    pub(crate) fn map_row(&self, row: &SourceRow<'_>) -> Result<Option<RosterRow>> {
        let name = row.get(Some(self.name));
        if name.is_missing() {
            return Ok(None);
        }
        let name = name.to_text();
        if name.trim().is_empty() {
            return Ok(None);
        }

        let fields = StudentFields {
            name,
            grade: grade_from(row.get(self.grade), row.number)?,
            gender: row.get(self.gender).to_text(),
            servant: row.get(self.servant).to_text(),
            phone: row.get(self.phone).to_text(),
            parent_phone: row.get(self.parent_phone).to_text(),
            dob: row.get(self.dob).to_text(),
            address: row.get(self.address).to_text(),
            comments: row.get(self.comments).to_text(),
            pictures: row.get(self.pictures).to_text(),
            last_call: row.get(self.last_call).to_text(),
        };
        Ok(Some(RosterRow {
            id: id_from(row.get(self.id)),
            fields,
        }))
    }
}

/// Ids are only trusted when they are whole numbers; anything else is ignored.
fn id_from(value: &RawValue) -> Option<i64> {
    match value {
        RawValue::Int(n) => Some(*n),
        RawValue::Float(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
        RawValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn grade_from(value: &RawValue, row_number: usize) -> Result<Option<i64>> {
    match value {
        RawValue::Empty | RawValue::Error(_) => Ok(None),
        RawValue::Int(n) => Ok(Some(*n)),
        RawValue::Float(n) if n.is_finite() => Ok(Some(n.trunc() as i64)),
        RawValue::Text(s) if s.trim().is_empty() => Ok(None),
        RawValue::Text(s) => s.trim().parse().map(Some).map_err(|_| {
            Error::SourceFormat(format!(
                "row {}: grade {:?} is not a whole number",
                row_number, s
            ))
        }),
        other => Err(Error::SourceFormat(format!(
            "row {}: grade {:?} is not a whole number",
            row_number,
            other.to_text()
        ))),
    }
}
