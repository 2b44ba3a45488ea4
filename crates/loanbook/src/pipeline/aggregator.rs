//! Per-channel payment aggregation.
//!
//! Each settlement channel has its own success filter and its own notion of
//! an outbound transfer; only inbound money counts toward repayment. The
//! aggregator reduces raw transaction rows to one amount-and-latest-paid
//! pair per loan per channel, plus the Stripe dispute adjustment that is
//! later subtracted from the combined total.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ChannelTotals, LoanId};

/// Arcus transaction status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcusStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    Returned,
}

impl ArcusStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Succeeded),
            2 => Some(Self::Failed),
            3 => Some(Self::Refunded),
            4 => Some(Self::Returned),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Succeeded => 1,
            Self::Failed => 2,
            Self::Refunded => 3,
            Self::Returned => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Refunded => "Refunded",
            Self::Returned => "Returned",
        }
    }
}

/// Stripe status code that counts toward repayment.
pub const STRIPE_STATUS_SUCCEEDED: i64 = 1;
/// Openpay status code that counts toward repayment.
pub const OPENPAY_STATUS_SUCCEEDED: i64 = 2;
/// Dispute resolution that claws a payment back.
pub const DISPUTE_STATUS_REMEDIATED_LOST: i64 = 2;

/// A raw Arcus (SPEI) transaction linked to a loan.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcusTransaction {
    pub loan_id: Option<LoanId>,
    pub amount: f64,
    pub status: ArcusStatus,
    pub is_distribution: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A raw Stripe transaction linked to a loan.
#[derive(Debug, Clone, PartialEq)]
pub struct StripeTransaction {
    pub loan_id: Option<LoanId>,
    pub amount: f64,
    pub status: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub dispute_status: Option<i64>,
}

/// A raw Openpay cash transaction linked to a loan.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenpayTransaction {
    pub loan_id: Option<LoanId>,
    pub amount: f64,
    pub status: i64,
    pub is_distribution: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Zero-filled payment view of one loan across every channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PaymentAggregates {
    pub arcus: ChannelTotals,
    pub stripe: ChannelTotals,
    pub cash: ChannelTotals,
    pub dispute_amount: f64,
}

/// All channel aggregates for a pipeline run, keyed by loan.
#[derive(Debug, Default)]
pub struct PaymentLedger {
    arcus: HashMap<LoanId, ChannelTotals>,
    stripe: HashMap<LoanId, ChannelTotals>,
    cash: HashMap<LoanId, ChannelTotals>,
    disputes: HashMap<LoanId, f64>,
}

impl PaymentLedger {
    pub fn aggregate(
        arcus: &[ArcusTransaction],
        stripe: &[StripeTransaction],
        cash: &[OpenpayTransaction],
    ) -> Self {
        let mut ledger = Self::default();

        for tx in arcus {
            let Some(loan_id) = &tx.loan_id else { continue };
            if tx.is_distribution || tx.status == ArcusStatus::Failed {
                continue;
            }
            accumulate(&mut ledger.arcus, loan_id, tx.amount, tx.completed_at);
        }

        for tx in stripe {
            let Some(loan_id) = &tx.loan_id else { continue };
            if tx.status != STRIPE_STATUS_SUCCEEDED {
                continue;
            }
            accumulate(&mut ledger.stripe, loan_id, tx.amount, tx.created_at);
            if tx.dispute_status == Some(DISPUTE_STATUS_REMEDIATED_LOST) {
                *ledger.disputes.entry(loan_id.clone()).or_default() += tx.amount;
            }
        }

        for tx in cash {
            let Some(loan_id) = &tx.loan_id else { continue };
            if tx.is_distribution || tx.status != OPENPAY_STATUS_SUCCEEDED {
                continue;
            }
            accumulate(&mut ledger.cash, loan_id, tx.amount, tx.created_at);
        }

        ledger
    }

    /// Channel totals for one loan; absence means no payment, not unknown.
    pub fn for_loan(&self, loan_id: &LoanId) -> PaymentAggregates {
        PaymentAggregates {
            arcus: self.arcus.get(loan_id).copied().unwrap_or_default(),
            stripe: self.stripe.get(loan_id).copied().unwrap_or_default(),
            cash: self.cash.get(loan_id).copied().unwrap_or_default(),
            dispute_amount: self.disputes.get(loan_id).copied().unwrap_or_default(),
        }
    }
}

fn accumulate(
    totals: &mut HashMap<LoanId, ChannelTotals>,
    loan_id: &LoanId,
    amount: f64,
    paid_at: Option<DateTime<Utc>>,
) {
    let entry = totals.entry(loan_id.clone()).or_default();
    entry.amount_paid += amount;
    entry.last_paid_at = match (entry.last_paid_at, paid_at) {
        (Some(current), Some(candidate)) => Some(current.max(candidate)),
        (current, candidate) => current.or(candidate),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn loan(id: &str) -> LoanId {
        LoanId(id.to_string())
    }

    fn at(day: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).single().expect("valid"))
    }

    fn arcus_tx(id: &str, amount: f64, status: ArcusStatus, distribution: bool) -> ArcusTransaction {
        ArcusTransaction {
            loan_id: Some(loan(id)),
            amount,
            status,
            is_distribution: distribution,
            completed_at: at(10),
        }
    }

    #[test]
    fn arcus_excludes_failed_and_outbound_rows() {
        let txs = vec![
            arcus_tx("L1", 300.0, ArcusStatus::Succeeded, false),
            arcus_tx("L1", 200.0, ArcusStatus::Pending, false),
            arcus_tx("L1", 999.0, ArcusStatus::Failed, false),
            arcus_tx("L1", 999.0, ArcusStatus::Succeeded, true),
        ];

        let ledger = PaymentLedger::aggregate(&txs, &[], &[]);
        let totals = ledger.for_loan(&loan("L1"));
        assert_eq!(totals.arcus.amount_paid, 500.0);
    }

    #[test]
    fn latest_completion_wins_and_none_is_ignored() {
        let mut first = arcus_tx("L1", 100.0, ArcusStatus::Succeeded, false);
        first.completed_at = at(3);
        let mut second = arcus_tx("L1", 100.0, ArcusStatus::Succeeded, false);
        second.completed_at = at(20);
        let mut third = arcus_tx("L1", 100.0, ArcusStatus::Succeeded, false);
        third.completed_at = None;

        let ledger = PaymentLedger::aggregate(&[first, second, third], &[], &[]);
        assert_eq!(ledger.for_loan(&loan("L1")).arcus.last_paid_at, at(20));
    }

    #[test]
    fn stripe_counts_only_succeeded_and_tracks_disputes() {
        let txs = vec![
            StripeTransaction {
                loan_id: Some(loan("L1")),
                amount: 400.0,
                status: STRIPE_STATUS_SUCCEEDED,
                created_at: at(5),
                dispute_status: None,
            },
            StripeTransaction {
                loan_id: Some(loan("L1")),
                amount: 150.0,
                status: STRIPE_STATUS_SUCCEEDED,
                created_at: at(6),
                dispute_status: Some(DISPUTE_STATUS_REMEDIATED_LOST),
            },
            StripeTransaction {
                loan_id: Some(loan("L1")),
                amount: 999.0,
                status: 0,
                created_at: at(7),
                dispute_status: None,
            },
        ];

        let ledger = PaymentLedger::aggregate(&[], &txs, &[]);
        let totals = ledger.for_loan(&loan("L1"));
        // The disputed row still sums into the channel; the clawback is a
        // separate negative adjustment downstream.
        assert_eq!(totals.stripe.amount_paid, 550.0);
        assert_eq!(totals.dispute_amount, 150.0);
    }

    #[test]
    fn cash_requires_succeeded_inbound_rows() {
        let txs = vec![
            OpenpayTransaction {
                loan_id: Some(loan("L1")),
                amount: 250.0,
                status: OPENPAY_STATUS_SUCCEEDED,
                is_distribution: false,
                created_at: at(8),
            },
            OpenpayTransaction {
                loan_id: Some(loan("L1")),
                amount: 999.0,
                status: OPENPAY_STATUS_SUCCEEDED,
                is_distribution: true,
                created_at: at(9),
            },
            OpenpayTransaction {
                loan_id: Some(loan("L1")),
                amount: 999.0,
                status: 1,
                is_distribution: false,
                created_at: at(9),
            },
        ];

        let ledger = PaymentLedger::aggregate(&[], &[], &txs);
        assert_eq!(ledger.for_loan(&loan("L1")).cash.amount_paid, 250.0);
    }

    #[test]
    fn unlinked_transactions_are_dropped() {
        let tx = ArcusTransaction {
            loan_id: None,
            amount: 500.0,
            status: ArcusStatus::Succeeded,
            is_distribution: false,
            completed_at: at(1),
        };

        let ledger = PaymentLedger::aggregate(&[tx], &[], &[]);
        assert_eq!(ledger.for_loan(&loan("L1")), PaymentAggregates::default());
    }
}
