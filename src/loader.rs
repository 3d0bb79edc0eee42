use tracing::{error, warn};

use crate::error::{AttendanceError, Result};
use crate::gateway::Gateway;
use crate::models::{Roster, SemesterWithCount, SubjectOption};

/// Splits a comma-separated subject catalog into picker options.
pub fn parse_subject_catalog(catalog: Option<&str>) -> Vec<SubjectOption> {
    let Some(catalog) = catalog else {
        return Vec::new();
    };
    if catalog.trim().is_empty() {
        return Vec::new();
    }
    catalog
        .split(',')
        .map(|token| SubjectOption::new(token.trim()))
        .collect()
}

/// Decodes the JSON subject list handed from the roster to the student view.
/// Malformed input yields an empty list.
pub fn parse_subject_list(encoded: &str) -> Vec<SubjectOption> {
    match serde_json::from_str::<Vec<SubjectOption>>(encoded) {
        Ok(subjects) => subjects,
        Err(err) => {
            error!(%err, "could not decode subject list");
            Vec::new()
        }
    }
}

/// Accepts either the JSON subject list or a plain comma-separated catalog.
pub fn parse_subject_argument(raw: &str) -> Vec<SubjectOption> {
    if raw.trim_start().starts_with('[') {
        parse_subject_list(raw)
    } else {
        parse_subject_catalog(Some(raw))
    }
}

async fn try_load_roster<G: Gateway + ?Sized>(gateway: &G, semester: &str) -> Result<Roster> {
    if semester.trim().is_empty() {
        return Err(AttendanceError::validation("Semester is required"));
    }

    let students = gateway.list_students(semester).await?;
    let catalog = gateway.semester_subjects(semester).await?;

    Ok(Roster {
        students,
        subjects: parse_subject_catalog(catalog.as_deref()),
    })
}

/// Students of `semester` (by name) and its subject options. Any failure,
/// including a blank semester name, is logged and yields an empty roster.
pub async fn load_roster<G: Gateway + ?Sized>(gateway: &G, semester: &str) -> Roster {
    match try_load_roster(gateway, semester).await {
        Ok(roster) => roster,
        Err(err) => {
            error!(semester, %err, "failed to load roster");
            Roster::default()
        }
    }
}

pub async fn load_semesters<G: Gateway + ?Sized>(gateway: &G) -> Vec<SemesterWithCount> {
    match gateway.list_semesters_with_count().await {
        Ok(semesters) => semesters,
        Err(err) => {
            error!(%err, "failed to load semesters");
            Vec::new()
        }
    }
}

/// Resolves the id of `semester` by name and loads its roster for a
/// roll-call. A given `semester_id` must match the named semester, and an
/// empty roster is refused so nothing is reported as saved.
pub async fn roll_call_target<G: Gateway + ?Sized>(
    gateway: &G,
    semester: &str,
    semester_id: Option<i64>,
) -> Result<(i64, Roster)> {
    let semesters = gateway.list_semesters_with_count().await?;
    let Some(entry) = semesters.iter().find(|e| e.semester.name == semester) else {
        return Err(AttendanceError::validation(format!(
            "unknown semester '{semester}'"
        )));
    };
    let resolved = entry.semester.semester_id;
    if let Some(given) = semester_id {
        if given != resolved {
            return Err(AttendanceError::validation(format!(
                "semester id {given} does not belong to semester '{semester}' (id {resolved})"
            )));
        }
    }

    let roster = load_roster(gateway, semester).await;
    if roster.students.is_empty() {
        warn!(semester, semester_id = resolved, "roster is empty; nothing to record");
        return Err(AttendanceError::validation(format!(
            "no students on the roster of semester '{semester}'"
        )));
    }
    Ok((resolved, roster))
}
