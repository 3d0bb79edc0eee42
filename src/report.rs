use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;
use tracing::error;

use crate::gateway::Gateway;
use crate::loader;
use crate::models::{
    AttendanceSummary, CalendarDay, DayMark, Student, SubjectAttendance, SubjectOption,
};
use crate::recorder::format_date;

/// Share of classes attended, rounded to the nearest whole percent. Zero when
/// no classes have been held.
pub fn percentage(total_present: i32, total_classes: i32) -> u32 {
    if total_classes <= 0 || total_present <= 0 {
        return 0;
    }
    let ratio = f64::from(total_present) / f64::from(total_classes);
    (ratio * 100.0).round().clamp(0.0, 100.0) as u32
}

fn attendance_for(subject: &str, summary: Option<&AttendanceSummary>) -> SubjectAttendance {
    let (total_present, total_classes) = summary
        .map(|s| (s.total_present, s.total_classes))
        .unwrap_or((0, 0));
    SubjectAttendance {
        subject: subject.to_string(),
        total_present,
        total_classes,
        percentage: percentage(total_present, total_classes),
    }
}

/// Per-subject totals for one student, in the order of `subjects`. Subjects
/// without a summary row, or a failed lookup, read as 0 of 0.
pub async fn subject_attendance<G: Gateway + ?Sized>(
    gateway: &G,
    student_id: i64,
    subjects: &[SubjectOption],
) -> Vec<SubjectAttendance> {
    if subjects.is_empty() {
        return Vec::new();
    }

    let names: Vec<String> = subjects.iter().map(|s| s.name.clone()).collect();
    let summaries = match gateway.list_summaries(student_id, &names).await {
        Ok(rows) => rows,
        Err(err) => {
            error!(student_id, %err, "failed to fetch attendance summary");
            Vec::new()
        }
    };

    let by_subject: HashMap<&str, &AttendanceSummary> =
        summaries.iter().map(|s| (s.subject.as_str(), s)).collect();
    names
        .iter()
        .map(|name| attendance_for(name, by_subject.get(name.as_str()).copied()))
        .collect()
}

pub async fn student_report<G: Gateway + ?Sized>(
    gateway: &G,
    student_id: i64,
    subject: &str,
) -> SubjectAttendance {
    match gateway.find_summary(student_id, subject).await {
        Ok(summary) => attendance_for(subject, summary.as_ref()),
        Err(err) => {
            error!(student_id, subject, %err, "failed to fetch attendance summary");
            attendance_for(subject, None)
        }
    }
}

/// Days with a recorded roll-call for the pair, plus `today`, which takes
/// precedence over an event on the same day. A failed lookup marks nothing.
pub async fn calendar<G: Gateway + ?Sized>(
    gateway: &G,
    student_id: i64,
    subject: &str,
    today: NaiveDate,
) -> Vec<CalendarDay> {
    let events = match gateway.list_events(student_id, subject).await {
        Ok(events) => events,
        Err(err) => {
            error!(student_id, subject, %err, "failed to fetch attendance dates");
            return Vec::new();
        }
    };

    let mut marks: std::collections::BTreeMap<NaiveDate, DayMark> =
        std::collections::BTreeMap::new();
    for event in events {
        let mark = if event.present {
            DayMark::Present
        } else {
            DayMark::Absent
        };
        // A present mark on a repeated roll-call wins over an absent one.
        marks
            .entry(event.date)
            .and_modify(|existing| {
                if mark == DayMark::Present {
                    *existing = mark;
                }
            })
            .or_insert(mark);
    }
    marks.insert(today, DayMark::Today);

    marks
        .into_iter()
        .map(|(date, mark)| CalendarDay { date, mark })
        .collect()
}

pub fn build_semester_report(
    semester: &str,
    subjects: &[SubjectOption],
    rows: &[(Student, Vec<SubjectAttendance>)],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Report");
    let _ = writeln!(output, "Semester {} ({} students)", semester, rows.len());
    let _ = writeln!(output);

    if subjects.is_empty() {
        let _ = writeln!(output, "No subjects configured for this semester.");
        return output;
    }

    for subject in subjects {
        let _ = writeln!(output, "## {}", subject.name);
        let mut lines = 0;
        for (student, attendance) in rows {
            let Some(entry) = attendance.iter().find(|a| a.subject == subject.name) else {
                continue;
            };
            let _ = writeln!(
                output,
                "- {} (roll {}): {}/{} classes, {}%",
                student.name, student.roll, entry.total_present, entry.total_classes, entry.percentage
            );
            lines += 1;
        }
        if lines == 0 {
            let _ = writeln!(output, "No students enrolled.");
        }
        let _ = writeln!(output);
    }

    let mut at_risk: Vec<(&Student, &SubjectAttendance)> = rows
        .iter()
        .flat_map(|(student, attendance)| attendance.iter().map(move |a| (student, a)))
        .filter(|(_, a)| a.total_classes > 0 && a.percentage < 75)
        .collect();
    at_risk.sort_by_key(|(_, a)| a.percentage);

    let _ = writeln!(output, "## Below 75%");
    if at_risk.is_empty() {
        let _ = writeln!(output, "Every student is at or above 75%.");
    } else {
        for (student, attendance) in at_risk {
            let _ = writeln!(
                output,
                "- {} in {}: {}%",
                student.name, attendance.subject, attendance.percentage
            );
        }
    }

    output
}

/// Loads the roster of `semester` and renders every student's attendance.
pub async fn semester_report<G: Gateway + ?Sized>(gateway: &G, semester: &str) -> String {
    let roster = loader::load_roster(gateway, semester).await;
    let mut rows = Vec::with_capacity(roster.students.len());
    for student in roster.students {
        let attendance = subject_attendance(gateway, student.student_id, &roster.subjects).await;
        rows.push((student, attendance));
    }
    build_semester_report(semester, &roster.subjects, &rows)
}

/// One line per subject: present of total, and the percentage.
pub fn render_subject_attendance(attendance: &[SubjectAttendance]) -> String {
    let mut output = String::new();
    for entry in attendance {
        let _ = writeln!(
            output,
            "- {}: {}/{} classes, {}%",
            entry.subject, entry.total_present, entry.total_classes, entry.percentage
        );
    }
    output
}

pub fn render_calendar(days: &[CalendarDay]) -> String {
    let mut output = String::new();
    for day in days {
        let label = match day.mark {
            DayMark::Present => "present",
            DayMark::Absent => "absent",
            DayMark::Today => "today",
        };
        let _ = writeln!(output, "{} {}", format_date(day.date), label);
    }
    output
}
