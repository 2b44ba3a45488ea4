//! Post-due-date classification.
//!
//! A loan enters post-due-date handling once a 30 hour grace window past
//! its due date's midnight elapses without settlement, or when collections
//! has already placed it on an explicitly post-due-date strategy.

use chrono::{Duration, NaiveDateTime};

use super::domain::CollectionStrategy;

/// Hours after the due date's midnight before a loan is treated as post DD.
pub const GRACE_PERIOD_HOURS: i64 = 30;

/// The instant at which the grace period ends for a due date.
pub fn grace_threshold(due_date: NaiveDateTime) -> NaiveDateTime {
    due_date
        .date()
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists for every date")
        + Duration::hours(GRACE_PERIOD_HOURS)
}

/// Whether the loan has entered post-due-date collections.
///
/// All datetimes are civil Mexico City; callers convert UTC instants
/// before calling in.
pub fn is_post_due_date(
    strategy: Option<CollectionStrategy>,
    due_date: NaiveDateTime,
    settled_at_cdmx: Option<NaiveDateTime>,
    now_cdmx: NaiveDateTime,
) -> bool {
    if strategy.is_some_and(CollectionStrategy::is_explicit_post_dd) {
        return true;
    }

    let threshold = grace_threshold(due_date);
    let past_due = due_date < now_cdmx;
    let settled_after_threshold = settled_at_cdmx.is_some_and(|settled| settled > threshold);
    let unsettled_past_grace = settled_at_cdmx.is_none()
        && now_cdmx - due_date > Duration::hours(GRACE_PERIOD_HOURS);

    past_due && (settled_after_threshold || unsettled_past_grace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .expect("valid date")
            .and_hms_opt(h, min, 0)
            .expect("valid time")
    }

    #[test]
    fn threshold_is_midnight_plus_thirty_hours() {
        assert_eq!(grace_threshold(dt(2025, 3, 1, 0, 0)), dt(2025, 3, 2, 6, 0));
        // Any intra-day due time floors to the same midnight first.
        assert_eq!(grace_threshold(dt(2025, 3, 1, 23, 59)), dt(2025, 3, 2, 6, 0));
    }

    #[test]
    fn unsettled_loan_past_grace_is_post_dd() {
        let due = dt(2025, 3, 1, 0, 0);
        assert!(is_post_due_date(None, due, None, dt(2025, 3, 3, 8, 0)));
    }

    #[test]
    fn unsettled_loan_inside_grace_is_not_post_dd() {
        let due = dt(2025, 3, 1, 0, 0);
        assert!(!is_post_due_date(None, due, None, dt(2025, 3, 2, 5, 0)));
    }

    #[test]
    fn settlement_after_threshold_is_post_dd() {
        let due = dt(2025, 3, 1, 0, 0);
        let settled = Some(dt(2025, 3, 2, 9, 30));
        assert!(is_post_due_date(None, due, settled, dt(2025, 4, 1, 0, 0)));
    }

    #[test]
    fn settlement_before_threshold_is_not_post_dd() {
        let due = dt(2025, 3, 1, 0, 0);
        let settled = Some(dt(2025, 3, 1, 18, 0));
        assert!(!is_post_due_date(None, due, settled, dt(2025, 4, 1, 0, 0)));
    }

    #[test]
    fn future_due_date_is_never_post_dd_without_a_strategy() {
        let due = dt(2025, 3, 10, 0, 0);
        assert!(!is_post_due_date(None, due, None, dt(2025, 3, 1, 0, 0)));
    }

    #[test]
    fn explicit_post_dd_strategy_overrides_dates() {
        let due = dt(2025, 3, 10, 0, 0);
        let strategy = Some(CollectionStrategy::Cmd);
        assert!(is_post_due_date(strategy, due, None, dt(2025, 3, 1, 0, 0)));
    }

    #[test]
    fn experiment_strategy_alone_does_not_flag() {
        let due = dt(2025, 3, 10, 0, 0);
        let strategy = Some(CollectionStrategy::MoonflowVariationV1);
        assert!(!is_post_due_date(strategy, due, None, dt(2025, 3, 1, 0, 0)));
    }
}
