use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::db::{AttendanceEntry, Database, StoreSnapshot, Student};
use crate::error::{Error, Result};
use crate::import::{HEADERS, ID_HEADER, SHEET_NAME};

/// Sheet listing every attendance record.
pub const ATTENDANCE_SHEET_NAME: &str = "Attendance Records";

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Json => "json",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "Excel",
            ExportFormat::Json => "JSON",
        }
    }

    /// Pick the format from a file extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" => Some(ExportFormat::Xlsx),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub students: usize,
    pub attendance: usize,
}

/// Write every student and attendance record to `output_path`.
pub fn export_store(db: &Database, output_path: &Path, format: ExportFormat) -> Result<ExportSummary> {
    let snapshot = db.export_snapshot()?;
    let summary = ExportSummary {
        students: snapshot.students.len(),
        attendance: snapshot.attendance.len(),
    };

    match format {
        ExportFormat::Xlsx => export_xlsx(&snapshot, output_path)?,
        ExportFormat::Json => export_json(&snapshot, output_path)?,
    }

    info!(
        "Exported {} students and {} attendance records to {:?} ({})",
        summary.students,
        summary.attendance,
        output_path,
        format.name()
    );
    Ok(summary)
}

fn export_json(snapshot: &StoreSnapshot, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| Error::Export(format!("Failed to serialize export: {}", e)))?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_xlsx(snapshot: &StoreSnapshot, output_path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    write_students(workbook.add_worksheet(), &snapshot.students, &header).map_err(xlsx_error)?;
    write_attendance(workbook.add_worksheet(), &snapshot.attendance, &header)
        .map_err(xlsx_error)?;

    workbook.save(output_path).map_err(xlsx_error)?;
    Ok(())
}

/// Roster sheet laid out with the import headers, so it can be imported again.
fn write_students(
    sheet: &mut Worksheet,
    students: &[Student],
    header: &Format,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name(SHEET_NAME)?;
    sheet.write_string_with_format(0, 0, ID_HEADER, header)?;
    for (col, title) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16 + 1, *title, header)?;
    }

    for (idx, student) in students.iter().enumerate() {
        let row = idx as u32 + 1;
        let f = &student.fields;
        sheet.write_number(row, 0, student.id as f64)?;
        sheet.write_string(row, 1, &f.name)?;
        if let Some(grade) = f.grade {
            sheet.write_number(row, 2, grade as f64)?;
        }

        let texts = [
            &f.gender,
            &f.servant,
            &f.phone,
            &f.parent_phone,
            &f.dob,
            &f.address,
            &f.comments,
            &f.pictures,
            &f.last_call,
        ];
        for (offset, value) in texts.iter().enumerate() {
            // Blank cells read back as empty text
            if !value.is_empty() {
                sheet.write_string(row, offset as u16 + 3, value.as_str())?;
            }
        }
    }
    Ok(())
}

fn write_attendance(
    sheet: &mut Worksheet,
    entries: &[AttendanceEntry],
    header: &Format,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name(ATTENDANCE_SHEET_NAME)?;
    for (col, title) in ["Name", "Date", "Status"].iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, header)?;
    }

    for (idx, entry) in entries.iter().enumerate() {
        let row = idx as u32 + 1;
        sheet.write_string(row, 0, &entry.name)?;
        sheet.write_string(row, 1, entry.date.format("%Y-%m-%d").to_string())?;
        sheet.write_string(row, 2, entry.status.as_str())?;
    }
    Ok(())
}

fn xlsx_error(e: XlsxError) -> Error {
    Error::Export(format!("Failed to write workbook: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, ImportConfig};
    use crate::db::{AttendanceStatus, StudentFields, StudentFilter};
    use crate::import::{ImportMode, ImportSummary, Reconciler, TabularSource, XlsxSource};
    use chrono::NaiveDate;

    fn open_test_db(dir: &Path) -> Database {
        let db = Database::open(&DatabaseConfig::at(dir.join("attendance.db"))).unwrap();
        db.initialize().unwrap();
        db
    }

    fn seed(db: &Database) {
        let sam = db
            .add_student(&StudentFields {
                grade: Some(6),
                gender: "M".to_string(),
                servant: "Mark".to_string(),
                phone: "5550101".to_string(),
                address: "1 Main St".to_string(),
                last_call: "2024-02-11".to_string(),
                ..StudentFields::named("Sam")
            })
            .unwrap();
        db.add_student(&StudentFields {
            comments: "Allergic to nuts".to_string(),
            ..StudentFields::named("Ann")
        })
        .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        db.record_attendance(sam, day, AttendanceStatus::Present)
            .unwrap();
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ExportFormat::from_path(Path::new("out/Kids.XLSX")),
            Some(ExportFormat::Xlsx)
        );
        assert_eq!(
            ExportFormat::from_path(Path::new("kids.json")),
            Some(ExportFormat::Json)
        );
        assert_eq!(ExportFormat::from_path(Path::new("kids.csv")), None);
        assert_eq!(ExportFormat::from_path(Path::new("kids")), None);
    }

    #[test]
    fn test_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(dir.path());
        seed(&db);

        let path = dir.path().join("export.json");
        let summary = export_store(&db, &path, ExportFormat::Json).unwrap();
        assert_eq!(summary, ExportSummary { students: 2, attendance: 1 });

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["students"].as_array().unwrap().len(), 2);
        assert_eq!(json["students"][0]["name"], "Sam");
        assert_eq!(json["attendance"][0]["status"], "present");
        assert_eq!(json["attendance"][0]["date"], "2024-03-01");
    }

    #[test]
    fn test_xlsx_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(dir.path());
        seed(&db);

        let path = dir.path().join("export.xlsx");
        export_store(&db, &path, ExportFormat::Xlsx).unwrap();

        let mut source = XlsxSource::open(&path).unwrap();
        assert_eq!(
            source.sheet_names(),
            vec![SHEET_NAME.to_string(), ATTENDANCE_SHEET_NAME.to_string()]
        );
        let attendance = source.read_sheet(ATTENDANCE_SHEET_NAME).unwrap();
        assert_eq!(attendance.headers(), ["Name", "Date", "Status"]);
        assert_eq!(attendance.len(), 1);
    }

    #[test]
    fn test_xlsx_round_trip_keeps_duplicate_names_apart() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(dir.path());
        for (grade, servant) in [(5, "Mark"), (9, "Mary")] {
            db.add_student(&StudentFields {
                grade: Some(grade),
                servant: servant.to_string(),
                ..StudentFields::named("Sam")
            })
            .unwrap();
        }
        let before = db.list_students(&StudentFilter::default()).unwrap();

        let path = dir.path().join("export.xlsx");
        export_store(&db, &path, ExportFormat::Xlsx).unwrap();
        let summary = Reconciler::new(&db, &ImportConfig::default())
            .import_file(&path, ImportMode::Merge)
            .unwrap();

        assert_eq!(summary, ImportSummary { added: 0, updated: 2 });
        let after = db.list_students(&StudentFilter::default()).unwrap();
        assert_eq!(after, before);
        let grades: Vec<_> = after.iter().map(|s| s.fields.grade).collect();
        assert_eq!(grades, vec![Some(5), Some(9)]);
    }

    #[test]
    fn test_xlsx_round_trip_through_merge() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(dir.path());
        seed(&db);
        let before = db.list_students(&StudentFilter::default()).unwrap();

        let path = dir.path().join("export.xlsx");
        export_store(&db, &path, ExportFormat::Xlsx).unwrap();

        let summary = Reconciler::new(&db, &ImportConfig::default())
            .import_file(&path, ImportMode::Merge)
            .unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                added: 0,
                updated: before.len()
            }
        );
        assert_eq!(db.list_students(&StudentFilter::default()).unwrap(), before);
    }
}
