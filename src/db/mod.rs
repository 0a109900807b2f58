mod schema;
pub mod attendance;
pub mod notes;
pub mod sqlite;
pub mod students;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

pub use schema::SCHEMA;
pub use attendance::{AttendanceEntry, AttendanceRecord, AttendanceStatus};
pub use notes::Note;
pub use students::{
    FilterOptions, Student, StudentDetails, StudentFields, StudentFilter, StudentSummary,
    StudentUpdate, UpsertOutcome,
};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Number of attendance entries shown on a student's detail view.
pub const HISTORY_LIMIT: usize = 20;

/// Full store contents, as handed to the exporter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreSnapshot {
    /// Ordered by id.
    pub students: Vec<Student>,
    /// Ordered by date descending, then student name.
    pub attendance: Vec<AttendanceEntry>,
}

/// Handle on the attendance database.
///
/// Holds no connection of its own: every operation opens a short-lived one,
/// and multi-row writes go through [`Database::with_transaction`].
pub struct Database {
    config: DatabaseConfig,
    created: bool,
}

impl Database {
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let created = !config.path.exists();
        let db = Self {
            config: config.clone(),
            created,
        };
        // Opening once creates the file and surfaces bad paths early.
        db.connect()?;
        debug!("Opened database at {:?} (new: {})", config.path, created);
        Ok(db)
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Whether the database file did not exist before [`Database::open`].
    pub fn is_new(&self) -> bool {
        self.created
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.config.path)?;
        conn.busy_timeout(self.config.busy_timeout())?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }

    /// Run `f` inside an immediate transaction.
    ///
    /// Commits when `f` returns `Ok`; any error rolls the whole unit back.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
