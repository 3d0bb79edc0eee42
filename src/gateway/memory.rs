use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{Gateway, GatewayResult};
use crate::error::GatewayError;
use crate::models::{
    AttendanceEvent, AttendanceSummary, NewSummary, Semester, SemesterWithCount, Student,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListSemesters,
    ListStudents,
    SemesterSubjects,
    InsertEvents,
    CountEvents,
    ListEvents,
    FindSummary,
    ListSummaries,
    WriteSummary,
    SetTotalPresent,
}

#[derive(Default)]
struct Tables {
    semesters: Vec<Semester>,
    students: Vec<Student>,
    events: Vec<AttendanceEvent>,
    summaries: Vec<AttendanceSummary>,
    next_summary_id: i64,
    /// Summary rows vanish just before a present-count overwrite lands.
    drop_before_overwrite: bool,
    /// (operation, student) pairs that fail; `None` fails for every student.
    failures: HashSet<(Op, Option<i64>)>,
}

/// In-process table set used by workflow tests.
#[derive(Default)]
pub struct MemoryGateway {
    tables: Mutex<Tables>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_semester(&self, semester_id: i64, name: &str, subjects: Option<&str>) {
        let mut tables = self.tables.lock().unwrap();
        tables.semesters.push(Semester {
            semester_id,
            name: name.to_string(),
            subjects: subjects.map(str::to_string),
            is_active: true,
        });
    }

    pub fn add_student(&self, student_id: i64, name: &str, roll: &str, semester: &str) -> Student {
        let student = Student {
            student_id,
            name: name.to_string(),
            roll: roll.to_string(),
            email: None,
            semester: semester.to_string(),
        };
        self.tables.lock().unwrap().students.push(student.clone());
        student
    }

    pub fn put_summary(&self, summary: NewSummary) {
        let mut tables = self.tables.lock().unwrap();
        let id = next_id(&mut tables);
        tables.summaries.push(to_row(id, &summary));
    }

    pub fn fail(&self, op: Op, student_id: Option<i64>) {
        self.tables.lock().unwrap().failures.insert((op, student_id));
    }

    pub fn drop_summaries_before_overwrite(&self) {
        self.tables.lock().unwrap().drop_before_overwrite = true;
    }

    pub fn events(&self) -> Vec<AttendanceEvent> {
        self.tables.lock().unwrap().events.clone()
    }

    pub fn summary(&self, student_id: i64, subject: &str) -> Option<(i32, i32)> {
        let tables = self.tables.lock().unwrap();
        tables
            .summaries
            .iter()
            .find(|s| s.student_id == student_id && s.subject == subject)
            .map(|s| (s.total_classes, s.total_present))
    }

    fn check(&self, tables: &Tables, op: Op, student_id: Option<i64>) -> GatewayResult<()> {
        let failing = tables.failures.contains(&(op, None))
            || student_id.is_some_and(|id| tables.failures.contains(&(op, Some(id))));
        if failing {
            Err(GatewayError::Database(sqlx::Error::Protocol(format!(
                "{op:?} failed"
            ))))
        } else {
            Ok(())
        }
    }
}

fn next_id(tables: &mut Tables) -> i64 {
    tables.next_summary_id += 1;
    tables.next_summary_id
}

fn to_row(id: i64, summary: &NewSummary) -> AttendanceSummary {
    AttendanceSummary {
        id,
        student_id: summary.student_id,
        semester_id: summary.semester_id,
        subject: summary.subject.clone(),
        total_classes: summary.total_classes,
        total_present: summary.total_present,
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn list_semesters_with_count(&self) -> GatewayResult<Vec<SemesterWithCount>> {
        let tables = self.tables.lock().unwrap();
        self.check(&tables, Op::ListSemesters, None)?;
        Ok(tables
            .semesters
            .iter()
            .map(|semester| SemesterWithCount {
                semester: semester.clone(),
                student_count: tables
                    .students
                    .iter()
                    .filter(|s| s.semester == semester.name)
                    .count() as i64,
            })
            .collect())
    }

    async fn list_students(&self, semester: &str) -> GatewayResult<Vec<Student>> {
        let tables = self.tables.lock().unwrap();
        self.check(&tables, Op::ListStudents, None)?;
        let mut students: Vec<Student> = tables
            .students
            .iter()
            .filter(|s| s.semester == semester)
            .cloned()
            .collect();
        students.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(students)
    }

    async fn semester_subjects(&self, semester: &str) -> GatewayResult<Option<String>> {
        let tables = self.tables.lock().unwrap();
        self.check(&tables, Op::SemesterSubjects, None)?;
        tables
            .semesters
            .iter()
            .find(|s| s.name == semester)
            .map(|s| s.subjects.clone())
            .ok_or(GatewayError::Database(sqlx::Error::RowNotFound))
    }

    async fn insert_events(&self, events: &[AttendanceEvent]) -> GatewayResult<()> {
        let mut tables = self.tables.lock().unwrap();
        self.check(&tables, Op::InsertEvents, None)?;
        tables.events.extend_from_slice(events);
        Ok(())
    }

    async fn count_events_on(
        &self,
        semester_id: i64,
        subject: &str,
        date: NaiveDate,
    ) -> GatewayResult<i64> {
        let tables = self.tables.lock().unwrap();
        self.check(&tables, Op::CountEvents, None)?;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.semester_id == semester_id && e.subject == subject && e.date == date)
            .count() as i64)
    }

    async fn list_events(
        &self,
        student_id: i64,
        subject: &str,
    ) -> GatewayResult<Vec<AttendanceEvent>> {
        let tables = self.tables.lock().unwrap();
        self.check(&tables, Op::ListEvents, Some(student_id))?;
        let mut events: Vec<AttendanceEvent> = tables
            .events
            .iter()
            .filter(|e| e.student_id == student_id && e.subject == subject)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date);
        Ok(events)
    }

    async fn list_semester_events(&self, semester_id: i64) -> GatewayResult<Vec<AttendanceEvent>> {
        let tables = self.tables.lock().unwrap();
        self.check(&tables, Op::ListEvents, None)?;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.semester_id == semester_id)
            .cloned()
            .collect())
    }

    async fn find_summary(
        &self,
        student_id: i64,
        subject: &str,
    ) -> GatewayResult<Option<AttendanceSummary>> {
        let tables = self.tables.lock().unwrap();
        self.check(&tables, Op::FindSummary, Some(student_id))?;
        Ok(tables
            .summaries
            .iter()
            .find(|s| s.student_id == student_id && s.subject == subject)
            .cloned())
    }

    async fn list_summaries(
        &self,
        student_id: i64,
        subjects: &[String],
    ) -> GatewayResult<Vec<AttendanceSummary>> {
        let tables = self.tables.lock().unwrap();
        self.check(&tables, Op::ListSummaries, Some(student_id))?;
        Ok(tables
            .summaries
            .iter()
            .filter(|s| s.student_id == student_id && subjects.contains(&s.subject))
            .cloned()
            .collect())
    }

    async fn update_summary(
        &self,
        id: i64,
        total_classes: i32,
        total_present: i32,
    ) -> GatewayResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let student_id = tables.summaries.iter().find(|s| s.id == id).map(|s| s.student_id);
        self.check(&tables, Op::WriteSummary, student_id)?;
        if let Some(row) = tables.summaries.iter_mut().find(|s| s.id == id) {
            row.total_classes = total_classes;
            row.total_present = total_present;
        }
        Ok(())
    }

    async fn insert_summary(&self, summary: &NewSummary) -> GatewayResult<()> {
        let mut tables = self.tables.lock().unwrap();
        self.check(&tables, Op::WriteSummary, Some(summary.student_id))?;
        let id = next_id(&mut tables);
        tables.summaries.push(to_row(id, summary));
        Ok(())
    }

    async fn increment_summary(&self, delta: &NewSummary) -> GatewayResult<()> {
        let mut tables = self.tables.lock().unwrap();
        self.check(&tables, Op::WriteSummary, Some(delta.student_id))?;
        let existing = tables
            .summaries
            .iter_mut()
            .find(|s| s.student_id == delta.student_id && s.subject == delta.subject);
        match existing {
            Some(row) => {
                row.total_classes += delta.total_classes;
                row.total_present += delta.total_present;
            }
            None => {
                let id = next_id(&mut tables);
                tables.summaries.push(to_row(id, delta));
            }
        }
        Ok(())
    }

    async fn replace_summary(&self, summary: &NewSummary) -> GatewayResult<()> {
        let mut tables = self.tables.lock().unwrap();
        self.check(&tables, Op::WriteSummary, Some(summary.student_id))?;
        let existing = tables
            .summaries
            .iter_mut()
            .find(|s| s.student_id == summary.student_id && s.subject == summary.subject);
        match existing {
            Some(row) => {
                row.total_classes = summary.total_classes;
                row.total_present = summary.total_present;
            }
            None => {
                let id = next_id(&mut tables);
                tables.summaries.push(to_row(id, summary));
            }
        }
        Ok(())
    }

    async fn set_total_present(
        &self,
        student_id: i64,
        subject: &str,
        total_present: i32,
    ) -> GatewayResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        self.check(&tables, Op::SetTotalPresent, Some(student_id))?;
        if tables.drop_before_overwrite {
            tables
                .summaries
                .retain(|s| !(s.student_id == student_id && s.subject == subject));
        }
        let mut touched = 0;
        for row in tables
            .summaries
            .iter_mut()
            .filter(|s| s.student_id == student_id && s.subject == subject)
        {
            row.total_present = total_present;
            touched += 1;
        }
        Ok(touched)
    }
}
