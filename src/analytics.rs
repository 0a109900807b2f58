//! Absence streaks, alert levels and dashboard figures.
//!
//! Everything here is a pure function of attendance data; the store gathers
//! the inputs (see `Database::analytics`).

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::db::{AttendanceRecord, AttendanceStatus};

/// Consecutive absences at which a student turns yellow.
pub const YELLOW_THRESHOLD: u32 = 2;
/// Consecutive absences at which a student turns red.
pub const RED_THRESHOLD: u32 = 4;
/// Trailing window, in days, used for the attendance rate.
pub const RATE_WINDOW_DAYS: i64 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    None,
    Yellow,
    Red,
}

impl AlertLevel {
    pub fn from_absences(consecutive_absences: u32) -> Self {
        if consecutive_absences >= RED_THRESHOLD {
            AlertLevel::Red
        } else if consecutive_absences >= YELLOW_THRESHOLD {
            AlertLevel::Yellow
        } else {
            AlertLevel::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::None => "none",
            AlertLevel::Yellow => "yellow",
            AlertLevel::Red => "red",
        }
    }
}

/// Length of the run of absences ending at the most recent record.
///
/// Records may come in any order; they are ranked by date, newest first.
pub fn consecutive_absences(history: &[AttendanceRecord]) -> u32 {
    let mut ordered: Vec<&AttendanceRecord> = history.iter().collect();
    ordered.sort_by(|a, b| b.date.cmp(&a.date));

    let mut count = 0;
    for record in ordered {
        if record.status != AttendanceStatus::Absent {
            break;
        }
        count += 1;
    }
    count
}

/// Percentage of present records, rounded to one decimal. Zero when there are none.
///
/// Exact ties round to even, so 6.25 becomes 6.2.
pub fn attendance_rate(present: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = present as f64 / total as f64 * 100.0;
    (rate * 10.0).round_ties_even() / 10.0
}

/// First date (inclusive) of the attendance-rate window ending at `today`.
pub fn window_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(RATE_WINDOW_DAYS)
}

/// Figures shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardAnalytics {
    pub total_students: usize,
    pub yellow_alerts: usize,
    pub red_alerts: usize,
    pub attendance_rate: f64,
}

/// Combine per-student alert levels with the statuses recorded inside the window.
pub fn aggregate(alerts: &[AlertLevel], window: &[AttendanceStatus]) -> DashboardAnalytics {
    let present = window
        .iter()
        .filter(|s| **s == AttendanceStatus::Present)
        .count();

    DashboardAnalytics {
        total_students: alerts.len(),
        yellow_alerts: alerts.iter().filter(|a| **a == AlertLevel::Yellow).count(),
        red_alerts: alerts.iter().filter(|a| **a == AlertLevel::Red).count(),
        attendance_rate: attendance_rate(present, window.len()),
    }
}
