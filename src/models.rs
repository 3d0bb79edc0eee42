use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Semester {
    pub semester_id: i64,
    pub name: String,
    /// Comma-separated subject catalog as stored.
    pub subjects: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct SemesterWithCount {
    pub semester: Semester,
    pub student_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub student_id: i64,
    pub name: String,
    pub roll: String,
    pub email: Option<String>,
    pub semester: String,
}

/// A selectable subject, shaped the way the subject picker consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectOption {
    pub name: String,
    pub value: String,
}

impl SubjectOption {
    pub fn new(name: &str) -> Self {
        SubjectOption {
            name: name.to_string(),
            value: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEvent {
    pub student_id: i64,
    pub semester_id: i64,
    pub subject: String,
    pub date: NaiveDate,
    pub present: bool,
    pub submission_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceSummary {
    pub id: i64,
    pub student_id: i64,
    pub semester_id: i64,
    pub subject: String,
    pub total_classes: i32,
    pub total_present: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSummary {
    pub student_id: i64,
    pub semester_id: i64,
    pub subject: String,
    pub total_classes: i32,
    pub total_present: i32,
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub students: Vec<Student>,
    pub subjects: Vec<SubjectOption>,
}

/// Result of one roll-call submission.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub submission_id: Uuid,
    pub date: NaiveDate,
    pub events_written: usize,
    pub summaries_reconciled: usize,
    /// Students whose summary could not be reconciled and now lag the events.
    pub summaries_failed: Vec<i64>,
    /// Events already existed for this semester, subject and date.
    pub repeated_roll_call: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAttendance {
    pub subject: String,
    pub total_present: i32,
    pub total_classes: i32,
    pub percentage: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayMark {
    Present,
    Absent,
    Today,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub mark: DayMark,
}
