//! Types for attendance records.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }

    /// Parse caller input, tolerating case and surrounding whitespace.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(Error::validation("attendance status is required"));
        }
        Self::from_str(&normalized).ok_or_else(|| {
            Error::validation(format!(
                "unknown attendance status {input:?}, expected present or absent"
            ))
        })
    }
}

/// One day of attendance for a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    pub fn new(date: NaiveDate, status: AttendanceStatus) -> Self {
        Self { date, status }
    }
}

/// Attendance joined with the student name, as exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceEntry {
    pub name: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(
            AttendanceStatus::parse(" Present ").unwrap(),
            AttendanceStatus::Present
        );
        assert_eq!(
            AttendanceStatus::parse("ABSENT").unwrap(),
            AttendanceStatus::Absent
        );
        assert!(matches!(
            AttendanceStatus::parse(""),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            AttendanceStatus::parse("late"),
            Err(Error::Validation(_))
        ));
    }
}
