use anyhow::Result;
use chrono::{DateTime, Utc};

use sevensenders_api::SevenSendersApi;
use sevensenders_config::Schedule;
use sevensenders_store::OrderStore;

use crate::export::Pipeline;
use crate::reconcile::ReconcileOutcome;
use crate::reporter::Reporter;

/// Whether a job on `schedule` that last ran at `last_run` is due at `now`.
pub fn is_due(schedule: Schedule, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_run {
        Some(last) => now - last >= schedule.interval(),
        None => true,
    }
}

/// Earliest time the next run is due; `now` if it never ran.
pub fn next_run(
    schedule: Schedule,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match last_run {
        Some(last) => last + schedule.interval(),
        None => now,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledRun {
    NotDue { next_run: DateTime<Utc> },
    Ran(ReconcileOutcome),
}

impl<A: SevenSendersApi, S: OrderStore> Pipeline<A, S> {
    /// Run reconciliation if the configured schedule says it is due.
    pub fn run_scheduled(&mut self, force: bool, reporter: &mut dyn Reporter) -> Result<ScheduledRun> {
        let schedule = self.config.schedule();
        let last_run = self.store.last_reconciled_at()?;
        let now = self.clock.now();

        if !force && !is_due(schedule, last_run, now) {
            let next_run = next_run(schedule, last_run, now);
            reporter.info(&format!(
                "{schedule} reconciliation not due until {}",
                next_run.to_rfc3339()
            ));
            return Ok(ScheduledRun::NotDue { next_run });
        }

        Ok(ScheduledRun::Ran(self.reconcile(reporter)?))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use sevensenders_store::MemoryStore;

    use super::*;
    use crate::clock::FixedClock;
    use crate::testing::{CollectingReporter, FakeApi, config_with};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 3, 0, 0).unwrap()
    }

    #[test]
    fn never_run_is_due() {
        assert!(is_due(Schedule::Daily, None, now()));
        assert_eq!(next_run(Schedule::Weekly, None, now()), now());
    }

    #[test]
    fn daily_and_weekly_intervals() {
        let last = now() - Duration::hours(23);
        assert!(!is_due(Schedule::Daily, Some(last), now()));
        assert!(is_due(Schedule::Daily, Some(now() - Duration::days(1)), now()));
        assert_eq!(next_run(Schedule::Daily, Some(last), now()), last + Duration::days(1));

        let last = now() - Duration::days(6);
        assert!(!is_due(Schedule::Weekly, Some(last), now()));
        assert!(is_due(Schedule::Weekly, Some(now() - Duration::days(8)), now()));
        assert_eq!(next_run(Schedule::Weekly, Some(last), now()), last + Duration::days(7));
    }

    fn pipeline(last_run: Option<DateTime<Utc>>) -> Pipeline<FakeApi, MemoryStore> {
        let mut store = MemoryStore::new();
        if let Some(at) = last_run {
            store.set_last_reconciled_at(at).unwrap();
        }
        Pipeline::new(
            config_with("[delivery]\nenabled = true\nschedule = \"weekly\"\n"),
            FakeApi::default(),
            store,
        )
        .with_clock(Box::new(FixedClock(now())))
    }

    #[test]
    fn scheduled_run_waits_for_interval() {
        let last = now() - Duration::days(2);
        let mut p = pipeline(Some(last));
        let mut reporter = CollectingReporter::default();

        let run = p.run_scheduled(false, &mut reporter).unwrap();
        assert_eq!(
            run,
            ScheduledRun::NotDue {
                next_run: last + Duration::days(7)
            }
        );
        assert_eq!(p.store().last_reconciled_at().unwrap(), Some(last));
    }

    #[test]
    fn forced_and_due_runs_reconcile() {
        let mut reporter = CollectingReporter::default();

        let mut forced = pipeline(Some(now() - Duration::days(2)));
        let run = forced.run_scheduled(true, &mut reporter).unwrap();
        assert!(matches!(run, ScheduledRun::Ran(ReconcileOutcome::Completed(_))));
        assert_eq!(forced.store().last_reconciled_at().unwrap(), Some(now()));

        let mut first = pipeline(None);
        let run = first.run_scheduled(false, &mut reporter).unwrap();
        assert!(matches!(run, ScheduledRun::Ran(ReconcileOutcome::Completed(_))));
    }
}
