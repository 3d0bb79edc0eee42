use std::collections::BTreeMap;

use tracing::{error, info};

use crate::config::ReconcileStrategy;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::models::{AttendanceEvent, NewSummary};

/// One student's outcome in a roll-call, as the reconciler needs it.
#[derive(Debug, Clone)]
pub struct Mark<'a> {
    pub student_id: i64,
    pub roll: &'a str,
    pub present: bool,
}

async fn read_modify_write<G: Gateway + ?Sized>(
    gateway: &G,
    mark: &Mark<'_>,
    semester_id: i64,
    subject: &str,
) -> Result<()> {
    let gained = i32::from(mark.present);
    // Not guarded against a concurrent submission for the same pair: the
    // later write wins and one increment is lost.
    match gateway.find_summary(mark.student_id, subject).await? {
        Some(summary) => {
            gateway
                .update_summary(
                    summary.id,
                    summary.total_classes + 1,
                    summary.total_present + gained,
                )
                .await?;
        }
        None => {
            gateway
                .insert_summary(&NewSummary {
                    student_id: mark.student_id,
                    semester_id,
                    subject: subject.to_string(),
                    total_classes: 1,
                    total_present: gained,
                })
                .await?;
        }
    }
    Ok(())
}

/// Brings one student's (student, subject) summary up to date with this
/// roll-call. Returns `false` if the summary was left untouched; the failure
/// is logged and never propagated.
pub async fn reconcile_summary<G: Gateway + ?Sized>(
    gateway: &G,
    mark: &Mark<'_>,
    semester_id: i64,
    subject: &str,
    strategy: ReconcileStrategy,
) -> bool {
    let result = match strategy {
        ReconcileStrategy::ReadModifyWrite => {
            read_modify_write(gateway, mark, semester_id, subject).await
        }
        ReconcileStrategy::AtomicIncrement => gateway
            .increment_summary(&NewSummary {
                student_id: mark.student_id,
                semester_id,
                subject: subject.to_string(),
                total_classes: 1,
                total_present: i32::from(mark.present),
            })
            .await
            .map_err(Into::into),
    };

    match result {
        Ok(()) => true,
        Err(err) => {
            error!(
                student_id = mark.student_id,
                roll = mark.roll,
                subject,
                %err,
                "summary reconciliation failed"
            );
            false
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RebuildOutcome {
    pub rebuilt: usize,
    pub failed: Vec<(i64, String)>,
}

/// Folds events into (student, subject) totals.
pub fn tally_events(events: &[AttendanceEvent], semester_id: i64) -> Vec<NewSummary> {
    let mut totals: BTreeMap<(i64, String), (i32, i32)> = BTreeMap::new();
    for event in events.iter().filter(|e| e.semester_id == semester_id) {
        let entry = totals
            .entry((event.student_id, event.subject.clone()))
            .or_insert((0, 0));
        entry.0 += 1;
        entry.1 += i32::from(event.present);
    }

    totals
        .into_iter()
        .map(|((student_id, subject), (total_classes, total_present))| NewSummary {
            student_id,
            semester_id,
            subject,
            total_classes,
            total_present,
        })
        .collect()
}

/// Recomputes every summary of a semester from its events. Failing to read
/// the events is fatal; a failed summary write is logged and skipped.
pub async fn rebuild_summaries<G: Gateway + ?Sized>(
    gateway: &G,
    semester_id: i64,
) -> Result<RebuildOutcome> {
    let events = gateway.list_semester_events(semester_id).await?;
    let mut outcome = RebuildOutcome::default();

    for summary in tally_events(&events, semester_id) {
        match gateway.replace_summary(&summary).await {
            Ok(()) => outcome.rebuilt += 1,
            Err(err) => {
                error!(
                    student_id = summary.student_id,
                    subject = %summary.subject,
                    %err,
                    "summary rebuild failed"
                );
                outcome.failed.push((summary.student_id, summary.subject));
            }
        }
    }

    info!(
        semester_id,
        events = events.len(),
        rebuilt = outcome.rebuilt,
        failed = outcome.failed.len(),
        "rebuilt summaries from events"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::{MemoryGateway, Op};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn mark(student_id: i64, present: bool) -> Mark<'static> {
        Mark {
            student_id,
            roll: "1",
            present,
        }
    }

    fn existing(gateway: &MemoryGateway, classes: i32, present: i32) {
        gateway.put_summary(NewSummary {
            student_id: 7,
            semester_id: 1,
            subject: "Physics".to_string(),
            total_classes: classes,
            total_present: present,
        });
    }

    #[tokio::test]
    async fn existing_summary_is_incremented() {
        for strategy in [ReconcileStrategy::ReadModifyWrite, ReconcileStrategy::AtomicIncrement] {
            let gateway = MemoryGateway::new();
            existing(&gateway, 4, 3);
            assert!(reconcile_summary(&gateway, &mark(7, true), 1, "Physics", strategy).await);
            assert_eq!(gateway.summary(7, "Physics"), Some((5, 4)));
            assert!(reconcile_summary(&gateway, &mark(7, false), 1, "Physics", strategy).await);
            assert_eq!(gateway.summary(7, "Physics"), Some((6, 4)));
        }
    }

    #[tokio::test]
    async fn first_roll_call_creates_summary() {
        for strategy in [ReconcileStrategy::ReadModifyWrite, ReconcileStrategy::AtomicIncrement] {
            let gateway = MemoryGateway::new();
            assert!(reconcile_summary(&gateway, &mark(1, true), 1, "Math", strategy).await);
            assert!(reconcile_summary(&gateway, &mark(2, false), 1, "Math", strategy).await);
            assert_eq!(gateway.summary(1, "Math"), Some((1, 1)));
            assert_eq!(gateway.summary(2, "Math"), Some((1, 0)));
        }
    }

    #[tokio::test]
    async fn lookup_failure_is_swallowed() {
        let gateway = MemoryGateway::new();
        existing(&gateway, 2, 2);
        gateway.fail(Op::FindSummary, Some(7));
        let ok = reconcile_summary(
            &gateway,
            &mark(7, true),
            1,
            "Physics",
            ReconcileStrategy::ReadModifyWrite,
        )
        .await;
        assert!(!ok);
        assert_eq!(gateway.summary(7, "Physics"), Some((2, 2)));
    }

    #[tokio::test]
    async fn write_failure_is_swallowed() {
        let gateway = MemoryGateway::new();
        gateway.fail(Op::WriteSummary, Some(7));
        for strategy in [ReconcileStrategy::ReadModifyWrite, ReconcileStrategy::AtomicIncrement] {
            assert!(!reconcile_summary(&gateway, &mark(7, true), 1, "Physics", strategy).await);
        }
        assert_eq!(gateway.summary(7, "Physics"), None);
    }

    fn event(student_id: i64, subject: &str, day: u32, present: bool) -> AttendanceEvent {
        AttendanceEvent {
            student_id,
            semester_id: 1,
            subject: subject.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            present,
            submission_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn tally_groups_by_student_and_subject() {
        let mut events = vec![
            event(1, "Math", 1, true),
            event(1, "Math", 2, false),
            event(1, "Chem", 2, true),
            event(2, "Math", 1, false),
        ];
        let mut other = event(3, "Math", 1, true);
        other.semester_id = 2;
        events.push(other);

        let tallies = tally_events(&events, 1);
        let triples: Vec<(i64, &str, i32, i32)> = tallies
            .iter()
            .map(|s| (s.student_id, s.subject.as_str(), s.total_classes, s.total_present))
            .collect();
        assert_eq!(
            triples,
            vec![(1, "Chem", 1, 1), (1, "Math", 2, 1), (2, "Math", 1, 0)]
        );
    }

    #[tokio::test]
    async fn rebuild_overwrites_drifted_summaries() {
        let gateway = MemoryGateway::new();
        existing(&gateway, 9, 9);
        gateway
            .insert_events(&[
                event(7, "Physics", 1, true),
                event(7, "Physics", 2, false),
                event(8, "Physics", 2, true),
            ])
            .await
            .unwrap();

        let outcome = rebuild_summaries(&gateway, 1).await.unwrap();
        assert_eq!(outcome.rebuilt, 2);
        assert!(outcome.failed.is_empty());
        assert_eq!(gateway.summary(7, "Physics"), Some((2, 1)));
        assert_eq!(gateway.summary(8, "Physics"), Some((1, 1)));
    }

    #[tokio::test]
    async fn rebuild_skips_failed_students() {
        let gateway = MemoryGateway::new();
        gateway
            .insert_events(&[event(7, "Physics", 1, true), event(8, "Physics", 1, false)])
            .await
            .unwrap();
        gateway.fail(Op::WriteSummary, Some(8));

        let outcome = rebuild_summaries(&gateway, 1).await.unwrap();
        assert_eq!(outcome.rebuilt, 1);
        assert_eq!(outcome.failed, vec![(8, "Physics".to_string())]);
        assert_eq!(gateway.summary(8, "Physics"), None);
    }

    #[tokio::test]
    async fn rebuild_fails_when_events_unreadable() {
        let gateway = MemoryGateway::new();
        gateway.fail(Op::ListEvents, None);
        assert!(rebuild_summaries(&gateway, 1).await.is_err());
    }
}
