use tracing::{error, info};

use crate::error::{AttendanceError, Result};
use crate::gateway::Gateway;

fn parse_total_present(raw: &str) -> Result<i32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AttendanceError::validation("New Attendance cannot be empty"));
    }
    let value: i32 = raw
        .parse()
        .map_err(|_| AttendanceError::validation(format!("'{raw}' is not a whole number")))?;
    if value < 0 {
        return Err(AttendanceError::validation("Attendance cannot be negative"));
    }
    Ok(value)
}

fn no_attendance(student_id: i64, subject: &str) -> AttendanceError {
    AttendanceError::validation(format!(
        "no attendance recorded for student {student_id} in {subject}"
    ))
}

/// Overwrites a student's present count for a subject, bypassing the
/// roll-call increments. `total_classes` is left alone.
pub async fn edit_total_present<G: Gateway + ?Sized>(
    gateway: &G,
    student_id: i64,
    subject: &str,
    raw_value: &str,
) -> Result<i32> {
    let value = parse_total_present(raw_value)?;

    let Some(summary) = gateway.find_summary(student_id, subject).await? else {
        return Err(no_attendance(student_id, subject));
    };
    if value > summary.total_classes {
        return Err(AttendanceError::validation(format!(
            "present count {value} exceeds the {} classes held",
            summary.total_classes
        )));
    }

    match gateway.set_total_present(student_id, subject, value).await {
        Ok(0) => Err(no_attendance(student_id, subject)),
        Ok(_) => {
            info!(
                student_id,
                subject,
                previous = summary.total_present,
                value,
                "attendance overwritten"
            );
            Ok(value)
        }
        Err(err) => {
            error!(student_id, subject, %err, "failed to overwrite attendance");
            Err(err.into())
        }
    }
}
