//! Spreadsheet reconciliation: bring the roster sheet into the store.

pub mod columns;
pub mod source;
pub mod xlsx;

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::db::sqlite::{
    insert_student, overwrite_student, overwrite_students_named, student_has_name,
    student_name_exists,
};
use crate::db::Database;
use crate::error::{Error, Result};

pub use columns::{HEADERS, ID as ID_HEADER, SHEET_NAME};
pub use source::{MemorySource, RawValue, Sheet, SourceRow, TabularSource};
pub use xlsx::XlsxSource;

use columns::{ColumnMap, RosterRow};

/// How rows whose name already exists in the store are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Insert new names only; existing students are left untouched.
    Fresh,
    /// Insert new names and overwrite every field of existing ones.
    Merge,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Fresh => "fresh",
            ImportMode::Merge => "merge",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
}

/// Caller-facing outcome of an import.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ImportReport {
    Success {
        success: bool,
        added: usize,
        updated: usize,
        message: String,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl ImportReport {
    pub fn from_result(result: &Result<ImportSummary>) -> Self {
        match result {
            Ok(summary) => ImportReport::Success {
                success: true,
                added: summary.added,
                updated: summary.updated,
                message: format!(
                    "Imported {} new kids, updated {} existing kids",
                    summary.added, summary.updated
                ),
            },
            Err(e) => ImportReport::Failure {
                success: false,
                error: e.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ImportReport::Success { .. })
    }
}

pub struct Reconciler<'a> {
    db: &'a Database,
    timeout: Duration,
}

impl<'a> Reconciler<'a> {
    pub fn new(db: &'a Database, config: &ImportConfig) -> Self {
        Self {
            db,
            timeout: config.timeout(),
        }
    }

    /// Import the roster sheet of a spreadsheet file.
    ///
    /// The file is read on a worker thread; if reading takes longer than the
    /// configured timeout the import fails and the store is not touched.
    pub fn import_file(&self, path: &Path, mode: ImportMode) -> Result<ImportSummary> {
        info!("Importing {:?} ({} mode)", path, mode.as_str());
        let owned: PathBuf = path.to_path_buf();
        let sheet = read_with_timeout(
            move || {
                let mut source = XlsxSource::open(&owned)?;
                read_roster(&mut source)
            },
            self.timeout,
        )?;
        self.reconcile(&sheet, mode)
    }

    /// Import the roster sheet from any tabular source, on the calling thread.
    pub fn import<S: TabularSource>(&self, source: &mut S, mode: ImportMode) -> Result<ImportSummary> {
        let sheet = read_roster(source)?;
        self.reconcile(&sheet, mode)
    }

    /// Apply an already-read roster sheet in a single transaction.
    pub fn reconcile(&self, sheet: &Sheet, mode: ImportMode) -> Result<ImportSummary> {
        let columns = ColumnMap::locate(sheet)?;

        let summary = self.db.with_transaction(|tx| {
            let mut summary = ImportSummary::default();
            let mut skipped = 0;

            for row in sheet.rows() {
                let Some(RosterRow { id, fields }) = columns.map_row(&row)? else {
                    skipped += 1;
                    continue;
                };

                // Rows carrying an exported id update only that student
                if let (ImportMode::Merge, Some(id)) = (mode, id) {
                    if student_has_name(tx, id, &fields.name)? {
                        overwrite_student(tx, id, &fields)?;
                        debug!("Row {}: overwrote {} by id {}", row.number, fields.name, id);
                        summary.updated += 1;
                        continue;
                    }
                }

                let exists = student_name_exists(tx, &fields.name)?;
                match (exists, mode) {
                    (false, _) => {
                        let id = insert_student(tx, &fields)?;
                        debug!("Row {}: added {} as {}", row.number, fields.name, id);
                        summary.added += 1;
                    }
                    (true, ImportMode::Merge) => {
                        let changed = overwrite_students_named(tx, &fields)?;
                        debug!("Row {}: overwrote {} ({} rows)", row.number, fields.name, changed);
                        summary.updated += 1;
                    }
                    (true, ImportMode::Fresh) => {
                        debug!("Row {}: {} already present, left as is", row.number, fields.name);
                    }
                }
            }

            if skipped > 0 {
                warn!("Skipped {} rows without a name", skipped);
            }
            Ok(summary)
        })?;

        info!(
            "Import complete: {} added, {} updated",
            summary.added, summary.updated
        );
        Ok(summary)
    }
}

/// Populate a newly created store from the configured spreadsheet, if any.
///
/// Returns `Ok(None)` when nothing was imported.
pub fn bootstrap(db: &Database, config: &ImportConfig) -> Result<Option<ImportSummary>> {
    if !db.is_new() {
        return Ok(None);
    }
    match &config.bootstrap_source {
        Some(path) if path.exists() => {
            info!("New database, importing initial roster from {:?}", path);
            Reconciler::new(db, config)
                .import_file(path, ImportMode::Fresh)
                .map(Some)
        }
        Some(path) => {
            warn!("Bootstrap spreadsheet {:?} not found, starting empty", path);
            Ok(None)
        }
        None => {
            info!("New database, starting empty");
            Ok(None)
        }
    }
}

fn read_roster<S: TabularSource + ?Sized>(source: &mut S) -> Result<Sheet> {
    let names = source.sheet_names();
    if !names.iter().any(|n| n == SHEET_NAME) {
        return Err(Error::SourceFormat(format!(
            "sheet '{}' not found (found: {})",
            SHEET_NAME,
            names.join(", ")
        )));
    }
    source.read_sheet(SHEET_NAME)
}

/// Run `read` on a worker thread, giving up after `timeout`.
///
/// The worker is left to finish on its own after a timeout; its result is dropped.
pub(crate) fn read_with_timeout<F>(read: F, timeout: Duration) -> Result<Sheet>
where
    F: FnOnce() -> Result<Sheet> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(read());
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::Timeout {
            operation: "spreadsheet read",
            after: timeout,
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::SourceFormat(
            "spreadsheet reader stopped unexpectedly".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::{StudentFields, StudentFilter};

    fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&DatabaseConfig::at(dir.path().join("attendance.db"))).unwrap();
        db.initialize().unwrap();
        (dir, db)
    }

    fn roster(rows: Vec<Vec<RawValue>>) -> MemorySource {
        let headers = vec!["Name".to_string(), "Grade".to_string(), "Servant".to_string()];
        MemorySource::new().with_sheet(SHEET_NAME, Sheet::new(headers, rows))
    }

    fn row(name: &str, grade: RawValue, servant: &str) -> Vec<RawValue> {
        vec![name.into(), grade, servant.into()]
    }

    fn names(db: &Database) -> Vec<String> {
        db.list_students(&StudentFilter::default())
            .unwrap()
            .into_iter()
            .map(|s| s.fields.name)
            .collect()
    }

    #[test]
    fn test_import_into_empty_store() {
        let (_dir, db) = open_test_db();
        let reconciler = Reconciler::new(&db, &ImportConfig::default());
        let mut source = roster(vec![
            row("Sam", RawValue::Int(5), "Mark"),
            row("Ann", RawValue::Float(6.0), "Mary"),
            row("", RawValue::Int(7), "Mary"),
        ]);

        let summary = reconciler.import(&mut source, ImportMode::Merge).unwrap();
        assert_eq!(summary, ImportSummary { added: 2, updated: 0 });
        assert_eq!(names(&db), vec!["Ann", "Sam"]);
    }

    #[test]
    fn test_merge_blank_grade_clears_it() {
        let (_dir, db) = open_test_db();
        let id = db
            .add_student(&StudentFields {
                grade: Some(5),
                servant: "Mark".to_string(),
                ..StudentFields::named("Sam")
            })
            .unwrap();

        let reconciler = Reconciler::new(&db, &ImportConfig::default());
        let mut source = roster(vec![row("Sam", RawValue::Empty, "Mary")]);
        let summary = reconciler.import(&mut source, ImportMode::Merge).unwrap();

        assert_eq!(summary, ImportSummary { added: 0, updated: 1 });
        let stored = db.get_student(id).unwrap();
        assert_eq!(stored.fields.grade, None);
        assert_eq!(stored.fields.servant, "Mary");
    }

    #[test]
    fn test_fresh_leaves_existing_untouched() {
        let (_dir, db) = open_test_db();
        let id = db
            .add_student(&StudentFields {
                grade: Some(5),
                ..StudentFields::named("Sam")
            })
            .unwrap();

        let reconciler = Reconciler::new(&db, &ImportConfig::default());
        let mut source = roster(vec![row("Sam", RawValue::Int(9), "Mary")]);
        let summary = reconciler.import(&mut source, ImportMode::Fresh).unwrap();

        assert_eq!(summary, ImportSummary::default());
        let stored = db.get_student(id).unwrap();
        assert_eq!(stored.fields.grade, Some(5));
        assert_eq!(stored.fields.servant, "");
    }

    #[test]
    fn test_merge_overwrites_every_duplicate() {
        let (_dir, db) = open_test_db();
        db.add_student(&StudentFields::named("Sam")).unwrap();
        db.add_student(&StudentFields::named("Sam")).unwrap();

        let reconciler = Reconciler::new(&db, &ImportConfig::default());
        let mut source = roster(vec![row("Sam", RawValue::Int(4), "Mark")]);
        let summary = reconciler.import(&mut source, ImportMode::Merge).unwrap();
        assert_eq!(summary.updated, 1);

        let students = db.list_students(&StudentFilter::default()).unwrap();
        assert!(students.iter().all(|s| s.fields.grade == Some(4)));
    }

    #[test]
    fn test_merge_with_id_column_targets_one_student() {
        let (_dir, db) = open_test_db();
        let first = db
            .add_student(&StudentFields {
                grade: Some(5),
                ..StudentFields::named("Sam")
            })
            .unwrap();
        let second = db
            .add_student(&StudentFields {
                grade: Some(9),
                ..StudentFields::named("Sam")
            })
            .unwrap();

        let headers = vec!["ID".to_string(), "Name".to_string(), "Grade".to_string()];
        let rows = vec![
            vec![RawValue::Int(first), "Sam".into(), RawValue::Int(6)],
            // Unknown id falls back to matching by name
            vec![RawValue::Int(999), "Ann".into(), RawValue::Int(3)],
        ];
        let mut source =
            MemorySource::new().with_sheet(SHEET_NAME, Sheet::new(headers, rows));

        let summary = Reconciler::new(&db, &ImportConfig::default())
            .import(&mut source, ImportMode::Merge)
            .unwrap();
        assert_eq!(summary, ImportSummary { added: 1, updated: 1 });
        assert_eq!(db.get_student(first).unwrap().fields.grade, Some(6));
        assert_eq!(db.get_student(second).unwrap().fields.grade, Some(9));
    }

    #[test]
    fn test_repeated_name_within_file() {
        let (_dir, db) = open_test_db();
        let reconciler = Reconciler::new(&db, &ImportConfig::default());
        let mut source = roster(vec![
            row("Sam", RawValue::Int(4), "Mark"),
            row("Sam", RawValue::Int(5), "Mary"),
        ]);

        let summary = reconciler.import(&mut source, ImportMode::Merge).unwrap();
        assert_eq!(summary, ImportSummary { added: 1, updated: 1 });

        let students = db.list_students(&StudentFilter::default()).unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].fields.grade, Some(5));
    }

    #[test]
    fn test_bad_row_rolls_back_everything() {
        let (_dir, db) = open_test_db();
        let reconciler = Reconciler::new(&db, &ImportConfig::default());
        let mut source = roster(vec![
            row("Sam", RawValue::Int(4), "Mark"),
            row("Ann", RawValue::Int(5), "Mary"),
            row("Bob", "fifth".into(), "Mary"),
        ]);

        let err = reconciler.import(&mut source, ImportMode::Merge).unwrap_err();
        assert!(matches!(err, Error::SourceFormat(_)));
        assert!(err.to_string().contains("row 4"));
        assert!(names(&db).is_empty());
    }

    #[test]
    fn test_missing_sheet_or_name_column() {
        let (_dir, db) = open_test_db();
        let reconciler = Reconciler::new(&db, &ImportConfig::default());

        let mut wrong_sheet = MemorySource::new().with_sheet(
            "Sheet1",
            Sheet::new(vec!["Name".to_string()], vec![vec!["Sam".into()]]),
        );
        assert!(matches!(
            reconciler.import(&mut wrong_sheet, ImportMode::Merge),
            Err(Error::SourceFormat(_))
        ));

        let mut no_name = MemorySource::new().with_sheet(
            SHEET_NAME,
            Sheet::new(vec!["Kid".to_string()], vec![vec!["Sam".into()]]),
        );
        assert!(matches!(
            reconciler.import(&mut no_name, ImportMode::Merge),
            Err(Error::SourceFormat(_))
        ));
        assert!(names(&db).is_empty());
    }

    #[test]
    fn test_read_timeout() {
        let result = read_with_timeout(
            || {
                thread::sleep(Duration::from_secs(2));
                Ok(Sheet::new(Vec::new(), Vec::new()))
            },
            Duration::from_millis(50),
        );
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[test]
    fn test_import_file_not_a_spreadsheet() {
        let (dir, db) = open_test_db();
        let path = dir.path().join("roster.xlsx");
        std::fs::write(&path, b"not a workbook").unwrap();

        let reconciler = Reconciler::new(&db, &ImportConfig::default());
        let result = reconciler.import_file(&path, ImportMode::Merge);
        assert!(matches!(result, Err(Error::SourceFormat(_))));
    }

    #[test]
    fn test_report_shapes() {
        let ok = ImportReport::from_result(&Ok(ImportSummary { added: 3, updated: 1 }));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["added"], 3);
        assert_eq!(json["updated"], 1);
        assert!(ok.is_success());

        let failed = ImportReport::from_result(&Err(Error::SourceFormat("bad".to_string())));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("bad"));
    }

    #[test]
    fn test_bootstrap_only_for_new_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::at(dir.path().join("attendance.db"));
        let import = ImportConfig {
            bootstrap_source: Some(dir.path().join("missing.xlsx")),
            ..ImportConfig::default()
        };

        let db = Database::open(&config).unwrap();
        db.initialize().unwrap();
        assert_eq!(bootstrap(&db, &import).unwrap(), None);

        let reopened = Database::open(&config).unwrap();
        assert!(!reopened.is_new());
        assert_eq!(bootstrap(&reopened, &import).unwrap(), None);
    }
}
