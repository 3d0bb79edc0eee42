use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Gateway, GatewayResult};
use crate::config::Config;
use crate::error::GatewayError;
use crate::models::{
    AttendanceEvent, AttendanceSummary, NewSummary, Semester, SemesterWithCount, Student,
};

/// Postgres-backed gateway. Built once at startup and shared by reference.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
    timeout: Duration,
}

impl PgGateway {
    pub async fn connect(config: &Config) -> GatewayResult<Self> {
        let timeout = config.request_timeout();
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(timeout)
            .connect(&config.database_url)
            .await?;
        info!(max_connections = config.max_connections, "connected to attendance backend");
        Ok(PgGateway { pool, timeout })
    }

    async fn bounded<T, F>(&self, fut: F) -> GatewayResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GatewayError::Timeout(self.timeout.as_secs())),
        }
    }

    pub async fn init_db(&self) -> GatewayResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn seed(&self) -> GatewayResult<()> {
        let semesters = vec![
            ("1st", "Mathematics, Physics, Chemistry", true, "2026"),
            ("2nd", "Data Structures, Discrete Math, Electronics", true, "2026"),
            ("3rd", "Algorithms, Databases, Operating Systems", false, "2025"),
        ];

        for (name, subjects, is_active, year) in semesters {
            self.bounded(
                sqlx::query(
                    r#"
                    INSERT INTO roll_call.semesters (name, subjects, is_active, year)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (name) DO UPDATE
                    SET subjects = EXCLUDED.subjects, is_active = EXCLUDED.is_active
                    "#,
                )
                .bind(name)
                .bind(subjects)
                .bind(is_active)
                .bind(year)
                .execute(&self.pool),
            )
            .await?;
        }

        let students = vec![
            ("Avery Lee", "1", "avery.lee@example.edu", "1st"),
            ("Jules Moreno", "2", "jules.moreno@example.edu", "1st"),
            ("Kiara Patel", "3", "kiara.patel@example.edu", "1st"),
            ("Noah Brooks", "1", "noah.brooks@example.edu", "2nd"),
            ("Sana Rahman", "2", "sana.rahman@example.edu", "2nd"),
        ];

        for (name, roll, email, semester) in students {
            self.upsert_student(name, roll, Some(email), semester).await?;
        }

        Ok(())
    }

    async fn upsert_student(
        &self,
        name: &str,
        roll: &str,
        email: Option<&str>,
        semester: &str,
    ) -> GatewayResult<i64> {
        let row = self
            .bounded(
                sqlx::query(
                    r#"
                    INSERT INTO roll_call.students (name, roll, email, semester)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (semester, roll) DO UPDATE
                    SET name = EXCLUDED.name, email = EXCLUDED.email
                    RETURNING student_id
                    "#,
                )
                .bind(name)
                .bind(roll)
                .bind(email)
                .bind(semester)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(row.get("student_id"))
    }

    /// Upserts roster rows from a CSV with `name,roll,email,semester` headers.
    /// Returns the number of rows processed.
    pub async fn import_roster(&self, csv_path: &Path) -> anyhow::Result<usize> {
        let rows = read_roster_csv(std::fs::File::open(csv_path)?)?;

        for row in &rows {
            let student_id = self
                .upsert_student(&row.name, &row.roll, row.email.as_deref(), &row.semester)
                .await?;
            debug!(student_id, roll = %row.roll, semester = %row.semester, "imported student");
        }

        Ok(rows.len())
    }
}

/// One roster line, trimmed, with a blank email read as absent.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct RosterRow {
    pub name: String,
    pub roll: String,
    pub email: Option<String>,
    pub semester: String,
}

pub fn read_roster_csv<R: std::io::Read>(input: R) -> anyhow::Result<Vec<RosterRow>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut rows = Vec::new();

    for result in reader.deserialize::<RosterRow>() {
        let row = result?;
        rows.push(RosterRow {
            name: row.name.trim().to_string(),
            roll: row.roll.trim().to_string(),
            email: row
                .email
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            semester: row.semester.trim().to_string(),
        });
    }

    Ok(rows)
}

fn event_from_row(row: &PgRow) -> AttendanceEvent {
    AttendanceEvent {
        student_id: row.get("student_id"),
        semester_id: row.get("semester_id"),
        subject: row.get("subject"),
        date: row.get("date"),
        present: row.get("present"),
        submission_id: row.get("submission_id"),
    }
}

fn summary_from_row(row: &PgRow) -> AttendanceSummary {
    AttendanceSummary {
        id: row.get("id"),
        student_id: row.get("student_id"),
        semester_id: row.get("semester_id"),
        subject: row.get("subject"),
        total_classes: row.get("total_classes"),
        total_present: row.get("total_present"),
    }
}

const EVENT_COLUMNS: &str = "student_id, semester_id, subject, date, present, submission_id";
const SUMMARY_COLUMNS: &str = "id, student_id, semester_id, subject, total_classes, total_present";

#[async_trait]
impl Gateway for PgGateway {
    async fn list_semesters_with_count(&self) -> GatewayResult<Vec<SemesterWithCount>> {
        let rows = self
            .bounded(
                sqlx::query(
                    "SELECT semester_id, name, subjects, is_active, student_count \
                     FROM roll_call.semesters_with_count ORDER BY name",
                )
                .fetch_all(&self.pool),
            )
            .await?;

        let mut semesters = Vec::new();
        for row in rows {
            semesters.push(SemesterWithCount {
                semester: Semester {
                    semester_id: row.get("semester_id"),
                    name: row.get("name"),
                    subjects: row.get("subjects"),
                    is_active: row.get("is_active"),
                },
                student_count: row.get("student_count"),
            });
        }
        Ok(semesters)
    }

    async fn list_students(&self, semester: &str) -> GatewayResult<Vec<Student>> {
        let rows = self
            .bounded(
                sqlx::query(
                    "SELECT student_id, name, roll, email, semester FROM roll_call.students \
                     WHERE semester = $1 ORDER BY name ASC",
                )
                .bind(semester)
                .fetch_all(&self.pool),
            )
            .await?;

        let mut students = Vec::new();
        for row in rows {
            students.push(Student {
                student_id: row.get("student_id"),
                name: row.get("name"),
                roll: row.get("roll"),
                email: row.get("email"),
                semester: row.get("semester"),
            });
        }
        Ok(students)
    }

    async fn semester_subjects(&self, semester: &str) -> GatewayResult<Option<String>> {
        let row = self
            .bounded(
                sqlx::query("SELECT subjects FROM roll_call.semesters WHERE name = $1")
                    .bind(semester)
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(row.get("subjects"))
    }

    async fn insert_events(&self, events: &[AttendanceEvent]) -> GatewayResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        let student_ids: Vec<i64> = events.iter().map(|e| e.student_id).collect();
        let semester_ids: Vec<i64> = events.iter().map(|e| e.semester_id).collect();
        let subjects: Vec<String> = events.iter().map(|e| e.subject.clone()).collect();
        let dates: Vec<NaiveDate> = events.iter().map(|e| e.date).collect();
        let present: Vec<bool> = events.iter().map(|e| e.present).collect();
        let submissions: Vec<Uuid> = events.iter().map(|e| e.submission_id).collect();

        // One statement, so the batch lands whole or not at all.
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO roll_call.attendance_dates
                (student_id, semester_id, subject, date, present, submission_id)
                SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::text[], $4::date[], $5::bool[], $6::uuid[])
                "#,
            )
            .bind(student_ids)
            .bind(semester_ids)
            .bind(subjects)
            .bind(dates)
            .bind(present)
            .bind(submissions)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn count_events_on(
        &self,
        semester_id: i64,
        subject: &str,
        date: NaiveDate,
    ) -> GatewayResult<i64> {
        let row = self
            .bounded(
                sqlx::query(
                    "SELECT COUNT(*) AS events FROM roll_call.attendance_dates \
                     WHERE semester_id = $1 AND subject = $2 AND date = $3",
                )
                .bind(semester_id)
                .bind(subject)
                .bind(date)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(row.get("events"))
    }

    async fn list_events(
        &self,
        student_id: i64,
        subject: &str,
    ) -> GatewayResult<Vec<AttendanceEvent>> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM roll_call.attendance_dates \
             WHERE student_id = $1 AND subject = $2 ORDER BY date"
        );
        let rows = self
            .bounded(
                sqlx::query(&query)
                    .bind(student_id)
                    .bind(subject)
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.iter().map(event_from_row).collect())
    }

    async fn list_semester_events(&self, semester_id: i64) -> GatewayResult<Vec<AttendanceEvent>> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM roll_call.attendance_dates \
             WHERE semester_id = $1 ORDER BY date"
        );
        let rows = self
            .bounded(sqlx::query(&query).bind(semester_id).fetch_all(&self.pool))
            .await?;
        Ok(rows.iter().map(event_from_row).collect())
    }

    async fn find_summary(
        &self,
        student_id: i64,
        subject: &str,
    ) -> GatewayResult<Option<AttendanceSummary>> {
        let query = format!(
            "SELECT {SUMMARY_COLUMNS} FROM roll_call.attendance_summary \
             WHERE student_id = $1 AND subject = $2"
        );
        let row = self
            .bounded(
                sqlx::query(&query)
                    .bind(student_id)
                    .bind(subject)
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.as_ref().map(summary_from_row))
    }

    async fn list_summaries(
        &self,
        student_id: i64,
        subjects: &[String],
    ) -> GatewayResult<Vec<AttendanceSummary>> {
        let query = format!(
            "SELECT {SUMMARY_COLUMNS} FROM roll_call.attendance_summary \
             WHERE student_id = $1 AND subject = ANY($2)"
        );
        let rows = self
            .bounded(
                sqlx::query(&query)
                    .bind(student_id)
                    .bind(subjects.to_vec())
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.iter().map(summary_from_row).collect())
    }

    async fn update_summary(
        &self,
        id: i64,
        total_classes: i32,
        total_present: i32,
    ) -> GatewayResult<()> {
        self.bounded(
            sqlx::query(
                "UPDATE roll_call.attendance_summary \
                 SET total_classes = $2, total_present = $3 WHERE id = $1",
            )
            .bind(id)
            .bind(total_classes)
            .bind(total_present)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn insert_summary(&self, summary: &NewSummary) -> GatewayResult<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO roll_call.attendance_summary
                (student_id, semester_id, subject, total_classes, total_present)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(summary.student_id)
            .bind(summary.semester_id)
            .bind(&summary.subject)
            .bind(summary.total_classes)
            .bind(summary.total_present)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn increment_summary(&self, delta: &NewSummary) -> GatewayResult<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO roll_call.attendance_summary
                (student_id, semester_id, subject, total_classes, total_present)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (student_id, subject) DO UPDATE
                SET total_classes = attendance_summary.total_classes + EXCLUDED.total_classes,
                    total_present = attendance_summary.total_present + EXCLUDED.total_present
                "#,
            )
            .bind(delta.student_id)
            .bind(delta.semester_id)
            .bind(&delta.subject)
            .bind(delta.total_classes)
            .bind(delta.total_present)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn replace_summary(&self, summary: &NewSummary) -> GatewayResult<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO roll_call.attendance_summary
                (student_id, semester_id, subject, total_classes, total_present)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (student_id, subject) DO UPDATE
                SET total_classes = EXCLUDED.total_classes,
                    total_present = EXCLUDED.total_present
                "#,
            )
            .bind(summary.student_id)
            .bind(summary.semester_id)
            .bind(&summary.subject)
            .bind(summary.total_classes)
            .bind(summary.total_present)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn set_total_present(
        &self,
        student_id: i64,
        subject: &str,
        total_present: i32,
    ) -> GatewayResult<u64> {
        let result = self
            .bounded(
                sqlx::query(
                    "UPDATE roll_call.attendance_summary SET total_present = $3 \
                     WHERE student_id = $1 AND subject = $2",
                )
                .bind(student_id)
                .bind(subject)
                .bind(total_present)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }
}
