//! Raw extract rows and their conversion into domain types.
//!
//! Column names match the upstream extracts so a snapshot file can be
//! produced straight from the production queries. Required loan
//! timestamps fail the extract when malformed; payment and strategy
//! timestamps are coerced to null instead, matching how the source data
//! actually behaves (completion times are frequently absent or junk).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::pipeline::aggregator::{
    ArcusStatus, ArcusTransaction, OpenpayTransaction, StripeTransaction,
};
use crate::pipeline::domain::{
    BorrowerId, CollectionStrategy, CreditPolicy, Loan, LoanId, LoanStatus, OfferPolicy,
    StrategyAssignment,
};

use super::ExtractError;

/// Parse an upstream timestamp as a UTC instant.
///
/// Accepts RFC 3339 with an offset, the naive SQL export forms, and a bare
/// date (read as midnight). Naive forms are UTC, which is how the source
/// database stores instants.
pub(crate) fn parse_utc_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    parse_naive_timestamp(trimmed).map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Parse a civil datetime with no zone attached (due dates).
pub(crate) fn parse_naive_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn required_utc(
    raw: &str,
    field: &'static str,
    loan_id: &str,
) -> Result<DateTime<Utc>, ExtractError> {
    parse_utc_timestamp(raw).ok_or_else(|| ExtractError::MalformedTimestamp {
        field,
        loan_id: loan_id.to_string(),
    })
}

/// One row of the loan extract.
#[derive(Debug, Deserialize)]
pub struct LoanRow {
    #[serde(rename = "UserId")]
    pub user_id: String,
    #[serde(rename = "UserLoanId")]
    pub user_loan_id: String,
    #[serde(rename = "IssueDate")]
    pub issue_date: String,
    #[serde(rename = "ModifiedAt")]
    pub modified_at: String,
    #[serde(rename = "DueDate")]
    pub due_date: String,
    #[serde(rename = "PrincipalAmount")]
    pub principal_amount: f64,
    #[serde(rename = "Fee")]
    pub fee: f64,
    #[serde(rename = "LateFee", default)]
    pub late_fee: Option<f64>,
    #[serde(rename = "LoanStatus")]
    pub loan_status: i64,
    #[serde(rename = "IsLate", default)]
    pub is_late: i64,
    #[serde(rename = "LoanNumber")]
    pub loan_number: u32,
    #[serde(rename = "FeeRatio", default)]
    pub fee_ratio: Option<f64>,
    #[serde(rename = "JitOfferPolicy", default)]
    pub jit_offer_policy: Option<i64>,
    #[serde(rename = "CreditPolicy", default)]
    pub credit_policy: Option<i64>,
    #[serde(rename = "MlScore", default)]
    pub ml_score: Option<f64>,
}

impl LoanRow {
    pub fn into_loan(self) -> Result<Loan, ExtractError> {
        let status = LoanStatus::from_code(self.loan_status).ok_or(
            ExtractError::UnknownLoanStatus {
                code: self.loan_status,
                loan_id: self.user_loan_id.clone(),
            },
        )?;

        let issued_at = required_utc(&self.issue_date, "IssueDate", &self.user_loan_id)?;
        let modified_at = required_utc(&self.modified_at, "ModifiedAt", &self.user_loan_id)?;
        let due_date = parse_naive_timestamp(&self.due_date).ok_or_else(|| {
            ExtractError::MalformedTimestamp {
                field: "DueDate",
                loan_id: self.user_loan_id.clone(),
            }
        })?;

        Ok(Loan {
            loan_id: LoanId(self.user_loan_id),
            borrower_id: BorrowerId(self.user_id),
            issued_at,
            modified_at,
            due_date,
            principal: self.principal_amount,
            fee: self.fee,
            fee_ratio: self.fee_ratio,
            is_late: self.is_late != 0,
            late_fee: self.late_fee.unwrap_or(0.0),
            status,
            loan_number: self.loan_number,
            offer_policy: self.jit_offer_policy.and_then(OfferPolicy::from_code),
            credit_policy: self.credit_policy.and_then(CreditPolicy::from_code),
            ml_score: self.ml_score,
        })
    }
}

/// One row of the Arcus transaction extract.
#[derive(Debug, Deserialize)]
pub struct ArcusRow {
    #[serde(rename = "UserLoanId", default)]
    pub user_loan_id: Option<String>,
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "Status")]
    pub status: i64,
    #[serde(rename = "IsDistribution", default)]
    pub is_distribution: i64,
    #[serde(rename = "CompletedAt", default)]
    pub completed_at: Option<String>,
}

impl ArcusRow {
    pub fn into_transaction(self) -> Result<ArcusTransaction, ExtractError> {
        let status = ArcusStatus::from_code(self.status).ok_or(ExtractError::UnknownArcusStatus {
            code: self.status,
        })?;

        Ok(ArcusTransaction {
            loan_id: self.user_loan_id.map(LoanId),
            amount: self.amount,
            status,
            is_distribution: self.is_distribution != 0,
            completed_at: self.completed_at.as_deref().and_then(parse_utc_timestamp),
        })
    }
}

/// One row of the Stripe transaction extract.
#[derive(Debug, Deserialize)]
pub struct StripeRow {
    #[serde(rename = "UserLoanId", default)]
    pub user_loan_id: Option<String>,
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "Status")]
    pub status: i64,
    #[serde(rename = "CreatedAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "DisputeStatus", default)]
    pub dispute_status: Option<i64>,
}

impl StripeRow {
    pub fn into_transaction(self) -> StripeTransaction {
        StripeTransaction {
            loan_id: self.user_loan_id.map(LoanId),
            amount: self.amount,
            status: self.status,
            created_at: self.created_at.as_deref().and_then(parse_utc_timestamp),
            dispute_status: self.dispute_status,
        }
    }
}

/// One row of the Openpay cash transaction extract.
#[derive(Debug, Deserialize)]
pub struct OpenpayRow {
    #[serde(rename = "UserLoanId", default)]
    pub user_loan_id: Option<String>,
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "Status")]
    pub status: i64,
    #[serde(rename = "IsDistribution", default)]
    pub is_distribution: i64,
    #[serde(rename = "CreatedAt", default)]
    pub created_at: Option<String>,
}

impl OpenpayRow {
    pub fn into_transaction(self) -> OpenpayTransaction {
        OpenpayTransaction {
            loan_id: self.user_loan_id.map(LoanId),
            amount: self.amount,
            status: self.status,
            is_distribution: self.is_distribution != 0,
            created_at: self.created_at.as_deref().and_then(parse_utc_timestamp),
        }
    }
}

/// One row of the collections strategy extract.
#[derive(Debug, Deserialize)]
pub struct StrategyRow {
    #[serde(rename = "UserLoanId")]
    pub user_loan_id: String,
    #[serde(rename = "Strategy")]
    pub strategy: i64,
    #[serde(rename = "CreatedAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "IsDeleted", default)]
    pub is_deleted: i64,
}

impl StrategyRow {
    /// Returns `None` for strategy ids outside the catalogue.
    pub fn into_assignment(self) -> Option<StrategyAssignment> {
        let strategy = CollectionStrategy::from_code(self.strategy)?;
        Some(StrategyAssignment {
            loan_id: LoanId(self.user_loan_id),
            strategy,
            assigned_at: self.created_at.as_deref().and_then(parse_utc_timestamp),
            is_deleted: self.is_deleted != 0,
        })
    }
}
