pub const SCHEMA: &str = r#"
-- Students: the roster
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    grade INTEGER,                          -- NULL when unknown
    gender TEXT NOT NULL DEFAULT '',
    servant TEXT NOT NULL DEFAULT '',       -- servant name, not a foreign key
    phone TEXT NOT NULL DEFAULT '',
    parent_phone TEXT NOT NULL DEFAULT '',
    dob TEXT NOT NULL DEFAULT '',
    address TEXT NOT NULL DEFAULT '',
    comments TEXT NOT NULL DEFAULT '',
    pictures TEXT NOT NULL DEFAULT '',
    last_call TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_students_name ON students(name);
CREATE INDEX IF NOT EXISTS idx_students_servant ON students(servant);

-- Attendance: one status per student per day
CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL,
    date TEXT NOT NULL,                     -- YYYY-MM-DD
    status TEXT NOT NULL CHECK (status IN ('present', 'absent')),
    UNIQUE (student_id, date),
    FOREIGN KEY (student_id) REFERENCES students(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date);

-- Servants registered before any student is assigned to them
CREATE TABLE IF NOT EXISTS servants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    phone TEXT NOT NULL DEFAULT ''
);

-- Notes: student_id has no foreign key, notes are kept when a student is deleted
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL,
    note_text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    created_by TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_notes_student ON notes(student_id);
"#;
