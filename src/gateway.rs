//! Table-level access to the attendance backend.
//!
//! Every workflow in this crate talks to storage only through [`Gateway`], so
//! the same code runs against Postgres in production and an in-memory table
//! set in tests.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::GatewayError;
use crate::models::{AttendanceEvent, AttendanceSummary, NewSummary, SemesterWithCount, Student};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[async_trait]
pub trait Gateway: Send + Sync {
    /// All semesters with their enrolled-student count.
    async fn list_semesters_with_count(&self) -> GatewayResult<Vec<SemesterWithCount>>;

    /// Students of a semester, ordered by name ascending.
    async fn list_students(&self, semester: &str) -> GatewayResult<Vec<Student>>;

    /// The subject catalog string of exactly one semester. A missing semester
    /// row is an error.
    async fn semester_subjects(&self, semester: &str) -> GatewayResult<Option<String>>;

    /// Inserts the whole batch or nothing.
    async fn insert_events(&self, events: &[AttendanceEvent]) -> GatewayResult<()>;

    async fn count_events_on(
        &self,
        semester_id: i64,
        subject: &str,
        date: NaiveDate,
    ) -> GatewayResult<i64>;

    async fn list_events(&self, student_id: i64, subject: &str)
        -> GatewayResult<Vec<AttendanceEvent>>;

    async fn list_semester_events(&self, semester_id: i64) -> GatewayResult<Vec<AttendanceEvent>>;

    async fn find_summary(
        &self,
        student_id: i64,
        subject: &str,
    ) -> GatewayResult<Option<AttendanceSummary>>;

    async fn list_summaries(
        &self,
        student_id: i64,
        subjects: &[String],
    ) -> GatewayResult<Vec<AttendanceSummary>>;

    async fn update_summary(
        &self,
        id: i64,
        total_classes: i32,
        total_present: i32,
    ) -> GatewayResult<()>;

    async fn insert_summary(&self, summary: &NewSummary) -> GatewayResult<()>;

    /// Creates the row with the given counts, or adds them to an existing row,
    /// in one server-side statement.
    async fn increment_summary(&self, delta: &NewSummary) -> GatewayResult<()>;

    /// Creates the row with the given counts, or overwrites an existing row.
    async fn replace_summary(&self, summary: &NewSummary) -> GatewayResult<()>;

    /// Overwrites `total_present` of the (student, subject) row. Returns the
    /// number of rows touched.
    async fn set_total_present(
        &self,
        student_id: i64,
        subject: &str,
        total_present: i32,
    ) -> GatewayResult<u64>;
}
