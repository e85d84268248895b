use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use tracing::warn;

use crate::types::Schedule;

/// Compute the next UTC execution time for `schedule` starting *after* `from`.
/// Returns `None` when the schedule is exhausted (`Once` already fired) or
/// not yet supported (`Cron` — parsing is out of scope here).
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Once { at } => {
            if *at > from {
                Some(*at)
            } else {
                None
            }
        }

        Schedule::Interval { every_secs } => Some(from + Duration::seconds(*every_secs as i64)),

        Schedule::Daily { hour, minute } => {
            let candidate = Utc
                .with_ymd_and_hms(from.year(), from.month(), from.day(), *hour as u32, *minute as u32, 0)
                .single()?;
            if candidate > from {
                Some(candidate)
            } else {
                Some(candidate + Duration::days(1))
            }
        }

        Schedule::Weekly { day, hour, minute } => {
            let today_dow = from.weekday().num_days_from_monday() as i64;
            let target_dow = (*day as i64).clamp(0, 6);
            let mut days_ahead = target_dow - today_dow;

            let candidate_day = if days_ahead < 0 {
                from + Duration::days(7 + days_ahead)
            } else {
                from + Duration::days(days_ahead)
            };

            let candidate = Utc
                .with_ymd_and_hms(
                    candidate_day.year(),
                    candidate_day.month(),
                    candidate_day.day(),
                    *hour as u32,
                    *minute as u32,
                    0,
                )
                .single()?;

            if candidate > from {
                Some(candidate)
            } else {
                days_ahead = if days_ahead <= 0 { 7 } else { 7 - days_ahead };
                Some(candidate + Duration::days(days_ahead))
            }
        }

        Schedule::Cron { .. } => {
            warn!("cron expression schedules are not yet parsed; next_run will not be set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_in_the_future_fires_at_its_instant() {
        let at = Utc::now() + Duration::hours(1);
        let from = Utc::now();
        assert_eq!(compute_next_run(&Schedule::Once { at }, from), Some(at));
    }

    #[test]
    fn once_already_passed_is_exhausted() {
        let at = Utc::now() - Duration::hours(1);
        let from = Utc::now();
        assert_eq!(compute_next_run(&Schedule::Once { at }, from), None);
    }

    #[test]
    fn interval_advances_by_the_configured_seconds() {
        let from = Utc::now();
        let next = compute_next_run(&Schedule::Interval { every_secs: 60 }, from).unwrap();
        assert_eq!((next - from).num_seconds(), 60);
    }

    #[test]
    fn cron_schedules_are_unsupported_for_now() {
        assert_eq!(
            compute_next_run(&Schedule::Cron { expression: "* * * * *".to_string() }, Utc::now()),
            None
        );
    }
}
