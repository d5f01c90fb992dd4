//! Daily scheduler.
//!
//! Fires the pipeline once a day at a wall-clock time in a fixed timezone.

use std::future::Future;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{error, info};

use crate::config::ScheduleConfig;
use crate::pipeline::DigestPipeline;

/// First instant strictly after `now` at which the local clock in `tz` reads `time`.
///
/// A time skipped by a DST jump fires at the first valid local instant after
/// the gap. A time that occurs twice fires at the earlier occurrence.
#[must_use]
pub fn next_run_after(now: DateTime<Utc>, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();

    // Today's slot may have passed; tomorrow's always exists unless it falls
    // in a gap, in which case the day after is the bound.
    (0..3)
        .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
        .filter_map(|date| resolve_local(date, time, tz))
        .find(|candidate| *candidate > now)
        .unwrap_or_else(|| now + Duration::days(1))
}

fn resolve_local(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    let wanted = NaiveDateTime::new(date, time);

    match tz.from_local_datetime(&wanted) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        // Gap: walk forward until the local clock exists again. No zone has a
        // gap longer than a day.
        LocalResult::None => (1..=24 * 60).find_map(|minutes| {
            match tz.from_local_datetime(&(wanted + Duration::minutes(minutes))) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    Some(dt.with_timezone(&Utc))
                }
                LocalResult::None => None,
            }
        }),
    }
}

/// Run the pipeline every day at the configured time until `shutdown` resolves.
pub async fn run_daily<F>(pipeline: DigestPipeline, schedule: ScheduleConfig, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let now = Utc::now();
        let next = next_run_after(now, schedule.time, schedule.timezone);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(
            next_run = %next.with_timezone(&schedule.timezone),
            wait_secs = wait.as_secs(),
            "Scheduled next digest run"
        );

        tokio::select! {
            () = &mut shutdown => {
                info!("Scheduler stopping");
                return;
            }
            () = tokio::time::sleep(wait) => {}
        }

        match pipeline.run(Utc::now()).await {
            Ok(report) => info!(
                run_id = %report.run_id,
                issues = report.issue_count,
                pages = report.page_count,
                "Scheduled digest sent"
            ),
            Err(e) => error!(error = %e, "Scheduled digest run failed"),
        }
    }
}
