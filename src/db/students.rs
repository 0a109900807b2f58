//! Types for students and roster queries.

use serde::Serialize;

use super::attendance::AttendanceRecord;
use super::notes::Note;
use crate::analytics::AlertLevel;

/// Every attribute of a student except its id.
///
/// `grade` is the only nullable column; text columns hold an empty string
/// when there is no value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudentFields {
    pub name: String,
    pub grade: Option<i64>,
    pub gender: String,
    pub servant: String,
    pub phone: String,
    pub parent_phone: String,
    pub dob: String,
    pub address: String,
    pub comments: String,
    pub pictures: String,
    pub last_call: String,
}

impl StudentFields {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Student {
    pub id: i64,
    #[serde(flatten)]
    pub fields: StudentFields,
}

/// Partial update; `None` leaves the stored value alone.
///
/// `grade` is doubly optional so that a caller can clear it with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub grade: Option<Option<i64>>,
    pub gender: Option<String>,
    pub servant: Option<String>,
    pub phone: Option<String>,
    pub parent_phone: Option<String>,
    pub dob: Option<String>,
    pub address: Option<String>,
    pub comments: Option<String>,
    pub pictures: Option<String>,
    pub last_call: Option<String>,
}

impl StudentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.grade.is_none()
            && self.gender.is_none()
            && self.servant.is_none()
            && self.phone.is_none()
            && self.parent_phone.is_none()
            && self.dob.is_none()
            && self.address.is_none()
            && self.comments.is_none()
            && self.pictures.is_none()
            && self.last_call.is_none()
    }
}

/// Exact-match roster filters; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentFilter {
    pub servant: Option<String>,
    pub grade: Option<i64>,
    pub gender: Option<String>,
}

/// A student with its derived attendance state.
#[derive(Debug, Clone, Serialize)]
pub struct StudentSummary {
    #[serde(flatten)]
    pub student: Student,
    pub alert_level: AlertLevel,
    pub consecutive_absences: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDetails {
    #[serde(flatten)]
    pub summary: StudentSummary,
    pub attendance_history: Vec<AttendanceRecord>,
    pub last_attendance: Option<AttendanceRecord>,
    pub notes: Vec<Note>,
}

/// Result of an upsert keyed on the student name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    /// Number of rows that carried the name.
    Updated(usize),
}

/// Distinct values offered by roster filter pickers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub grades: Vec<i64>,
    pub genders: Vec<String>,
}
