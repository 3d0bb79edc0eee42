use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ReconcileStrategy;
use crate::error::{AttendanceError, Result};
use crate::gateway::Gateway;
use crate::models::{AttendanceEvent, Student, SubmissionOutcome};
use crate::reconciler::{reconcile_summary, Mark};

/// Wire format of attendance dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn attendance_date() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// One event per roster student; anyone not in `present_rolls` is absent.
pub fn build_events(
    roster: &[Student],
    semester_id: i64,
    subject: &str,
    present_rolls: &HashSet<String>,
    date: NaiveDate,
    submission_id: Uuid,
) -> Vec<AttendanceEvent> {
    roster
        .iter()
        .map(|student| AttendanceEvent {
            student_id: student.student_id,
            semester_id,
            subject: subject.to_string(),
            date,
            present: present_rolls.contains(&student.roll),
            submission_id,
        })
        .collect()
}

/// A roll-call in progress: the subject and the rolls toggled present.
#[derive(Debug, Default)]
pub struct Selection {
    pub subject: String,
    pub present_rolls: HashSet<String>,
}

impl Selection {
    pub fn new(subject: &str) -> Self {
        Selection {
            subject: subject.to_string(),
            present_rolls: HashSet::new(),
        }
    }

    pub fn toggle(&mut self, roll: &str) {
        if !self.present_rolls.remove(roll) {
            self.present_rolls.insert(roll.to_string());
        }
    }

    pub fn clear(&mut self) {
        self.subject.clear();
        self.present_rolls.clear();
    }
}

pub struct Recorder<'g, G: Gateway + ?Sized> {
    gateway: &'g G,
    strategy: ReconcileStrategy,
}

impl<'g, G: Gateway + ?Sized> Recorder<'g, G> {
    pub fn new(gateway: &'g G, strategy: ReconcileStrategy) -> Self {
        Recorder { gateway, strategy }
    }

    /// Records today's roll-call and clears `selection` on success. If the
    /// event batch cannot be written nothing else is touched and the
    /// selection is kept for a retry.
    pub async fn submit(
        &self,
        roster: &[Student],
        semester_id: i64,
        selection: &mut Selection,
    ) -> Result<SubmissionOutcome> {
        let outcome = self
            .record(roster, semester_id, &selection.subject, &selection.present_rolls)
            .await?;
        selection.clear();
        Ok(outcome)
    }

    pub async fn record(
        &self,
        roster: &[Student],
        semester_id: i64,
        subject: &str,
        present_rolls: &HashSet<String>,
    ) -> Result<SubmissionOutcome> {
        self.record_on(roster, semester_id, subject, present_rolls, attendance_date())
            .await
    }

    /// Same as [`Recorder::record`] with an explicit date, captured once for
    /// the whole batch.
    pub async fn record_on(
        &self,
        roster: &[Student],
        semester_id: i64,
        subject: &str,
        present_rolls: &HashSet<String>,
        date: NaiveDate,
    ) -> Result<SubmissionOutcome> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(AttendanceError::validation("Please select a subject"));
        }

        let submission_id = Uuid::new_v4();
        let repeated_roll_call = self.already_taken(semester_id, subject, date).await;

        let events = build_events(roster, semester_id, subject, present_rolls, date, submission_id);
        if let Err(err) = self.gateway.insert_events(&events).await {
            error!(%submission_id, subject, %err, "failed to save attendance events");
            return Err(err.into());
        }

        let mut outcome = SubmissionOutcome {
            submission_id,
            date,
            events_written: events.len(),
            summaries_reconciled: 0,
            summaries_failed: Vec::new(),
            repeated_roll_call,
        };

        for student in roster {
            let mark = Mark {
                student_id: student.student_id,
                roll: &student.roll,
                present: present_rolls.contains(&student.roll),
            };
            if reconcile_summary(self.gateway, &mark, semester_id, subject, self.strategy).await {
                outcome.summaries_reconciled += 1;
            } else {
                outcome.summaries_failed.push(student.student_id);
            }
        }

        info!(
            %submission_id,
            semester_id,
            subject,
            date = %format_date(date),
            events = outcome.events_written,
            reconciled = outcome.summaries_reconciled,
            failed = outcome.summaries_failed.len(),
            "attendance saved"
        );
        Ok(outcome)
    }

    /// Flags, but never blocks, a second roll-call for the same day.
    async fn already_taken(&self, semester_id: i64, subject: &str, date: NaiveDate) -> bool {
        match self.gateway.count_events_on(semester_id, subject, date).await {
            Ok(0) => false,
            Ok(existing) => {
                warn!(
                    semester_id,
                    subject,
                    date = %format_date(date),
                    existing,
                    "roll-call already recorded today; totals will count it again"
                );
                true
            }
            Err(err) => {
                warn!(%err, "could not check for an earlier roll-call");
                false
            }
        }
    }
}
