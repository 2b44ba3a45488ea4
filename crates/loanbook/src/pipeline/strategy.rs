//! Collections strategy selection.
//!
//! A loan accumulates strategy assignments over time; only the most recent
//! non-deleted assignment from the post-due-date whitelist survives as the
//! primary, with noisy or missing timestamps replaced by the grace-period
//! boundary. Loans without a surviving assignment default to the outbound
//! voice channel. The late-stage test lives in a disjoint id and attaches
//! independently.

use chrono::NaiveDateTime;

use super::delinquency::{grace_threshold, is_post_due_date};
use super::domain::{
    CollectionStrategy, LateStageTest, LoanCollections, StrategyAssignment,
    FALLBACK_STRATEGY_NAME,
};
use crate::time;

/// Pick the surviving primary assignment among a loan's rows.
///
/// Restricts to whitelisted, non-deleted rows; newest assignment first,
/// null timestamps last, ties resolved by original row order.
pub fn select_primary<'a>(assignments: &[&'a StrategyAssignment]) -> Option<&'a StrategyAssignment> {
    most_recent(
        assignments
            .iter()
            .copied()
            .filter(|row| row.strategy.is_post_dd_workflow() && !row.is_deleted),
    )
}

/// Pick the latest non-deleted late-stage test row, if any.
pub fn select_late_stage_test<'a>(
    assignments: &[&'a StrategyAssignment],
) -> Option<&'a StrategyAssignment> {
    most_recent(
        assignments
            .iter()
            .copied()
            .filter(|row| row.strategy.is_late_stage_test() && !row.is_deleted),
    )
}

fn most_recent<'a>(
    rows: impl Iterator<Item = &'a StrategyAssignment>,
) -> Option<&'a StrategyAssignment> {
    let mut eligible: Vec<&StrategyAssignment> = rows.collect();
    // Newest first, null timestamps last; stable so input order breaks ties.
    eligible.sort_by_key(|row| match row.assigned_at {
        Some(at) => (0, std::cmp::Reverse(at)),
        None => (1, std::cmp::Reverse(chrono::DateTime::<chrono::Utc>::MIN_UTC)),
    });
    eligible.first().copied()
}

/// Resolve a loan's collections state from its assignment rows.
///
/// Returns the post-due-date flag alongside the collections record because
/// the flag decides whether the experiment back-fill applies.
pub fn resolve_collections(
    assignments: &[&StrategyAssignment],
    due_date: NaiveDateTime,
    settled_at_cdmx: Option<NaiveDateTime>,
    now_cdmx: NaiveDateTime,
) -> (bool, LoanCollections) {
    let primary = select_primary(assignments);
    let is_post_dd = is_post_due_date(
        primary.map(|row| row.strategy),
        due_date,
        settled_at_cdmx,
        now_cdmx,
    );

    let collections = match primary {
        Some(row) => {
            let backfill = row.assigned_at.is_none()
                || (is_post_dd && row.strategy.is_auto_assigned_experiment());

            let (assigned_at, assigned_at_cdmx) = if backfill {
                let threshold = grace_threshold(due_date);
                (Some(time::cdmx_to_utc(threshold)), Some(threshold))
            } else {
                (row.assigned_at, row.assigned_at.map(time::to_cdmx))
            };

            LoanCollections {
                strategy: Some(row.strategy),
                strategy_name: row.strategy.name().to_string(),
                assigned_at,
                assigned_at_cdmx,
                late_stage_test: None,
            }
        }
        None => LoanCollections {
            strategy: None,
            strategy_name: FALLBACK_STRATEGY_NAME.to_string(),
            assigned_at: None,
            assigned_at_cdmx: None,
            late_stage_test: None,
        },
    };

    let late_stage_test = select_late_stage_test(assignments).map(|row| LateStageTest {
        strategy: row.strategy,
        assigned_at: row.assigned_at,
        assigned_at_cdmx: row.assigned_at.map(time::to_cdmx),
    });

    (
        is_post_dd,
        LoanCollections {
            late_stage_test,
            ..collections
        },
    )
}
