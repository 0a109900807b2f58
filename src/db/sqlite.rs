//! SQLite implementation of the record store operations.

use chrono::{Local, NaiveDate};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::{
    AttendanceEntry, AttendanceRecord, AttendanceStatus, Database, FilterOptions, Note,
    StoreSnapshot, Student, StudentDetails, StudentFields, StudentFilter, StudentSummary,
    StudentUpdate, UpsertOutcome, HISTORY_LIMIT,
};
use crate::analytics::{self, AlertLevel, DashboardAnalytics};
use crate::error::{Error, Result};

const STUDENT_COLUMNS: &str = "id, name, grade, gender, servant, phone, parent_phone, \
                               dob, address, comments, pictures, last_call";

impl Database {
    // ========================================================================
    // Student operations
    // ========================================================================

    pub fn get_student(&self, id: i64) -> Result<Student> {
        let conn = self.connect()?;
        find_student(&conn, id)?.ok_or_else(|| Error::student_not_found(id))
    }

    pub fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>> {
        let conn = self.connect()?;
        list_students(&conn, filter)
    }

    /// Students matching `filter`, each with its absence streak and alert level.
    pub fn list_student_summaries(&self, filter: &StudentFilter) -> Result<Vec<StudentSummary>> {
        let conn = self.connect()?;
        list_students(&conn, filter)?
            .into_iter()
            .map(|student| summarize(&conn, student))
            .collect()
    }

    pub fn students_by_servant(&self, servant: &str) -> Result<Vec<StudentSummary>> {
        self.list_student_summaries(&StudentFilter {
            servant: Some(servant.to_string()),
            ..Default::default()
        })
    }

    pub fn add_student(&self, fields: &StudentFields) -> Result<i64> {
        require_name(fields)?;
        let conn = self.connect()?;
        let id = insert_student(&conn, fields)?;
        info!("Added student {} ({})", id, fields.name);
        Ok(id)
    }

    pub fn update_student(&self, id: i64, update: &StudentUpdate) -> Result<()> {
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(Error::validation("student name cannot be blank"));
            }
        }

        let conn = self.connect()?;
        if update.is_empty() {
            return find_student(&conn, id)?
                .map(|_| ())
                .ok_or_else(|| Error::student_not_found(id));
        }

        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        let texts = [
            ("name = ?", &update.name),
            ("gender = ?", &update.gender),
            ("servant = ?", &update.servant),
            ("phone = ?", &update.phone),
            ("parent_phone = ?", &update.parent_phone),
            ("dob = ?", &update.dob),
            ("address = ?", &update.address),
            ("comments = ?", &update.comments),
            ("pictures = ?", &update.pictures),
            ("last_call = ?", &update.last_call),
        ];
        for (assignment, value) in texts {
            if let Some(value) = value {
                assignments.push(assignment);
                values.push(Value::Text(value.clone()));
            }
        }
        if let Some(grade) = update.grade {
            assignments.push("grade = ?");
            values.push(grade.map(Value::Integer).unwrap_or(Value::Null));
        }
        values.push(Value::Integer(id));

        let sql = format!("UPDATE students SET {} WHERE id = ?", assignments.join(", "));
        let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Err(Error::student_not_found(id));
        }
        debug!("Updated student {}", id);
        Ok(())
    }

    /// Overwrite every student carrying `fields.name`, or insert one if none does.
    pub fn upsert_student(&self, fields: &StudentFields) -> Result<UpsertOutcome> {
        require_name(fields)?;
        self.with_transaction(|tx| {
            if student_name_exists(tx, &fields.name)? {
                Ok(UpsertOutcome::Updated(overwrite_students_named(tx, fields)?))
            } else {
                Ok(UpsertOutcome::Inserted(insert_student(tx, fields)?))
            }
        })
    }

    /// Remove a student and its attendance. Notes are left in place.
    pub fn delete_student(&self, id: i64) -> Result<()> {
        self.with_transaction(|tx| {
            if find_student(tx, id)?.is_none() {
                return Err(Error::student_not_found(id));
            }
            let removed = tx.execute("DELETE FROM attendance WHERE student_id = ?", [id])?;
            tx.execute("DELETE FROM students WHERE id = ?", [id])?;
            info!("Deleted student {} and {} attendance records", id, removed);
            Ok(())
        })
    }

    pub fn student_details(&self, id: i64) -> Result<StudentDetails> {
        let conn = self.connect()?;
        let student = find_student(&conn, id)?.ok_or_else(|| Error::student_not_found(id))?;
        let summary = summarize(&conn, student)?;
        let attendance_history = attendance_for(&conn, id, Some(HISTORY_LIMIT))?;
        let last_attendance = attendance_history.first().copied();
        let notes = notes_for(&conn, id)?;

        Ok(StudentDetails {
            summary,
            attendance_history,
            last_attendance,
            notes,
        })
    }

    /// Distinct grades and genders on the roster, optionally for one servant.
    pub fn filter_options(&self, servant: Option<&str>) -> Result<FilterOptions> {
        let conn = self.connect()?;
        let servant_clause = if servant.is_some() { " AND servant = ?" } else { "" };
        let args: Vec<&str> = servant.into_iter().collect();

        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT grade FROM students WHERE grade IS NOT NULL{servant_clause} ORDER BY grade"
        ))?;
        let grades = stmt
            .query_map(params_from_iter(args.iter()), |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT gender FROM students WHERE gender != ''{servant_clause} ORDER BY gender"
        ))?;
        let genders = stmt
            .query_map(params_from_iter(args.iter()), |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(FilterOptions { grades, genders })
    }

    // ========================================================================
    // Attendance operations
    // ========================================================================

    /// Store a status for the day, replacing any earlier one.
    pub fn record_attendance(
        &self,
        student_id: i64,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<()> {
        let conn = self.connect()?;
        write_attendance(&conn, student_id, date, status)
    }

    /// Store several statuses for one day as a single unit.
    pub fn record_attendance_batch(
        &self,
        date: NaiveDate,
        entries: &[(i64, AttendanceStatus)],
    ) -> Result<usize> {
        let written = self.with_transaction(|tx| {
            for (student_id, status) in entries {
                write_attendance(tx, *student_id, date, *status)?;
            }
            Ok(entries.len())
        })?;
        info!("Recorded {} attendance entries for {}", written, date);
        Ok(written)
    }

    /// Attendance for a student, newest first.
    pub fn list_attendance(
        &self,
        student_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<AttendanceRecord>> {
        let conn = self.connect()?;
        attendance_for(&conn, student_id, limit)
    }

    pub fn consecutive_absences(&self, student_id: i64) -> Result<u32> {
        let conn = self.connect()?;
        let history = attendance_for(&conn, student_id, None)?;
        Ok(analytics::consecutive_absences(&history))
    }

    pub fn alert_level(&self, student_id: i64) -> Result<AlertLevel> {
        Ok(AlertLevel::from_absences(
            self.consecutive_absences(student_id)?,
        ))
    }

    /// Dashboard figures with the attendance window ending at `today`.
    ///
    /// Alert levels are recomputed for every student on each call.
    pub fn analytics(&self, today: NaiveDate) -> Result<DashboardAnalytics> {
        let conn = self.connect()?;

        let mut stmt = conn.prepare("SELECT id FROM students")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        let mut alerts = Vec::with_capacity(ids.len());
        for id in ids {
            let history = attendance_for(&conn, id, None)?;
            alerts.push(AlertLevel::from_absences(analytics::consecutive_absences(
                &history,
            )));
        }

        let mut stmt = conn.prepare("SELECT status FROM attendance WHERE date >= ?")?;
        let window = stmt
            .query_map([analytics::window_start(today)], |row| status_at(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(analytics::aggregate(&alerts, &window))
    }

    // ========================================================================
    // Notes and servants
    // ========================================================================

    pub fn add_note(&self, student_id: i64, note_text: &str, created_by: &str) -> Result<i64> {
        if note_text.trim().is_empty() {
            return Err(Error::validation("note text is required"));
        }
        let conn = self.connect()?;
        if find_student(&conn, student_id)?.is_none() {
            return Err(Error::student_not_found(student_id));
        }

        let created_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        conn.execute(
            "INSERT INTO notes (student_id, note_text, created_at, created_by) VALUES (?, ?, ?, ?)",
            params![student_id, note_text, created_at, created_by],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Notes for a student id, newest first. Still answers after the student is deleted.
    pub fn list_notes(&self, student_id: i64) -> Result<Vec<Note>> {
        let conn = self.connect()?;
        notes_for(&conn, student_id)
    }

    /// Register a servant. Returns false when the name was already registered.
    pub fn add_servant(&self, name: &str, phone: &str) -> Result<bool> {
        if name.trim().is_empty() {
            return Err(Error::validation("servant name is required"));
        }
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO servants (name, phone) VALUES (?, ?)",
            params![name, phone],
        )?;
        Ok(inserted > 0)
    }

    /// Servant names from the roster and the servants table, sorted and deduplicated.
    pub fn list_servants(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT servant FROM students WHERE servant IS NOT NULL AND servant != ''
            UNION
            SELECT name FROM servants
            ORDER BY 1
            "#,
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    // ========================================================================
    // Export
    // ========================================================================

    pub fn export_snapshot(&self) -> Result<StoreSnapshot> {
        let conn = self.connect()?;
        let mut students = list_students(&conn, &StudentFilter::default())?;
        students.sort_by_key(|s| s.id);

        let mut stmt = conn.prepare(
            r#"
            SELECT s.name, a.date, a.status
            FROM attendance a
            JOIN students s ON a.student_id = s.id
            ORDER BY a.date DESC, s.name ASC
            "#,
        )?;
        let attendance = stmt
            .query_map([], |row| {
                Ok(AttendanceEntry {
                    name: row.get(0)?,
                    date: row.get(1)?,
                    status: status_at(row, 2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(StoreSnapshot {
            students,
            attendance,
        })
    }
}

// ============================================================================
// Connection-level helpers, shared with the reconciler's transaction
// ============================================================================

pub(crate) fn student_name_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM students WHERE name = ? LIMIT 1", [name], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn insert_student(conn: &Connection, fields: &StudentFields) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO students
            (name, grade, gender, servant, phone, parent_phone, dob, address, comments, pictures, last_call)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            fields.name,
            fields.grade,
            fields.gender,
            fields.servant,
            fields.phone,
            fields.parent_phone,
            fields.dob,
            fields.address,
            fields.comments,
            fields.pictures,
            fields.last_call,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Replace all attributes of the students named `fields.name`, blanks included.
pub(crate) fn overwrite_students_named(conn: &Connection, fields: &StudentFields) -> Result<usize> {
    let changed = conn.execute(
        r#"
        UPDATE students SET
            grade = ?, gender = ?, servant = ?, phone = ?, parent_phone = ?,
            dob = ?, address = ?, comments = ?, pictures = ?, last_call = ?
        WHERE name = ?
        "#,
        params![
            fields.grade,
            fields.gender,
            fields.servant,
            fields.phone,
            fields.parent_phone,
            fields.dob,
            fields.address,
            fields.comments,
            fields.pictures,
            fields.last_call,
            fields.name,
        ],
    )?;
    Ok(changed)
}

/// Whether student `id` exists and is still called `name`.
pub(crate) fn student_has_name(conn: &Connection, id: i64, name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND name = ?",
            params![id, name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Replace all attributes of one student except its name.
pub(crate) fn overwrite_student(conn: &Connection, id: i64, fields: &StudentFields) -> Result<()> {
    let changed = conn.execute(
        r#"
        UPDATE students SET
            grade = ?, gender = ?, servant = ?, phone = ?, parent_phone = ?,
            dob = ?, address = ?, comments = ?, pictures = ?, last_call = ?
        WHERE id = ?
        "#,
        params![
            fields.grade,
            fields.gender,
            fields.servant,
            fields.phone,
            fields.parent_phone,
            fields.dob,
            fields.address,
            fields.comments,
            fields.pictures,
            fields.last_call,
            id,
        ],
    )?;
    if changed == 0 {
        return Err(Error::student_not_found(id));
    }
    Ok(())
}

fn require_name(fields: &StudentFields) -> Result<()> {
    if fields.has_name() {
        Ok(())
    } else {
        Err(Error::validation("student name is required"))
    }
}

fn find_student(conn: &Connection, id: i64) -> Result<Option<Student>> {
    let student = conn
        .query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"),
            [id],
            student_from_row,
        )
        .optional()?;
    Ok(student)
}

fn list_students(conn: &Connection, filter: &StudentFilter) -> Result<Vec<Student>> {
    let mut sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE 1=1");
    let mut values: Vec<Value> = Vec::new();

    if let Some(servant) = &filter.servant {
        sql.push_str(" AND servant = ?");
        values.push(Value::Text(servant.clone()));
    }
    if let Some(grade) = filter.grade {
        sql.push_str(" AND grade = ?");
        values.push(Value::Integer(grade));
    }
    if let Some(gender) = &filter.gender {
        sql.push_str(" AND gender = ?");
        values.push(Value::Text(gender.clone()));
    }
    sql.push_str(" ORDER BY name, id");

    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map(params_from_iter(values.iter()), student_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(students)
}

fn summarize(conn: &Connection, student: Student) -> Result<StudentSummary> {
    let history = attendance_for(conn, student.id, None)?;
    let consecutive_absences = analytics::consecutive_absences(&history);
    Ok(StudentSummary {
        student,
        alert_level: AlertLevel::from_absences(consecutive_absences),
        consecutive_absences,
    })
}

fn write_attendance(
    conn: &Connection,
    student_id: i64,
    date: NaiveDate,
    status: AttendanceStatus,
) -> Result<()> {
    if find_student(conn, student_id)?.is_none() {
        return Err(Error::student_not_found(student_id));
    }
    conn.execute(
        r#"
        INSERT INTO attendance (student_id, date, status) VALUES (?, ?, ?)
        ON CONFLICT (student_id, date) DO UPDATE SET status = excluded.status
        "#,
        params![student_id, date, status.as_str()],
    )?;
    debug!("Attendance {} for student {} on {}", status.as_str(), student_id, date);
    Ok(())
}

fn attendance_for(
    conn: &Connection,
    student_id: i64,
    limit: Option<usize>,
) -> Result<Vec<AttendanceRecord>> {
    // SQLite treats a negative LIMIT as no limit.
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    let mut stmt = conn.prepare(
        "SELECT date, status FROM attendance WHERE student_id = ? ORDER BY date DESC LIMIT ?",
    )?;
    let records = stmt
        .query_map(params![student_id, limit], |row| {
            Ok(AttendanceRecord {
                date: row.get(0)?,
                status: status_at(row, 1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

fn notes_for(conn: &Connection, student_id: i64) -> Result<Vec<Note>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, student_id, note_text, created_at, created_by
        FROM notes
        WHERE student_id = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )?;
    let notes = stmt
        .query_map([student_id], |row| {
            Ok(Note {
                id: row.get(0)?,
                student_id: row.get(1)?,
                note_text: row.get(2)?,
                created_at: row.get(3)?,
                created_by: text_at(row, 4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(notes)
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        fields: StudentFields {
            name: row.get(1)?,
            grade: row.get(2)?,
            gender: text_at(row, 3)?,
            servant: text_at(row, 4)?,
            phone: text_at(row, 5)?,
            parent_phone: text_at(row, 6)?,
            dob: text_at(row, 7)?,
            address: text_at(row, 8)?,
            comments: text_at(row, 9)?,
            pictures: text_at(row, 10)?,
            last_call: text_at(row, 11)?,
        },
    })
}

/// Text column read with NULL mapped to the empty string.
fn text_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<AttendanceStatus> {
    let raw: String = row.get(idx)?;
    AttendanceStatus::from_str(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown attendance status {raw:?}").into(),
        )
    })
}
