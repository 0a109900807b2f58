//! Free-text notes attached to students.

use serde::Serialize;

/// Free-text annotation on a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id: i64,
    pub student_id: i64,
    pub note_text: String,
    pub created_at: String,  // local time, "YYYY-MM-DD HH:MM:SS"
    pub created_by: String,
}
