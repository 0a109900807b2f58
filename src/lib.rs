//! Attendance tracking for a youth group: roster, weekly attendance,
//! absence alerts and spreadsheet import/export.

pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;

pub use error::{Error, Result};
