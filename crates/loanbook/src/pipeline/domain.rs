//! Domain model for the loan repayment pipeline.
//!
//! Numeric codes mirror the production database; labels mirror the names
//! the business uses in its dashboards, so warehouse consumers see the
//! same vocabulary before and after a pipeline run.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time;

/// IVA applied to fee components.
pub const IVA_RATE: f64 = 0.16;

/// Identifier wrapper for loans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanId(pub String);

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for borrowers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BorrowerId(pub String);

/// Loan lifecycle status, carrying the upstream numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    Created,
    Active,
    Repaid,
    Defaulted,
    Repaying,
    DisbursementFailed,
    Disbursing,
    CollectionFailed,
}

impl LoanStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Created),
            1 => Some(Self::Active),
            2 => Some(Self::Repaid),
            3 => Some(Self::Defaulted),
            5 => Some(Self::Repaying),
            6 => Some(Self::DisbursementFailed),
            7 => Some(Self::Disbursing),
            8 => Some(Self::CollectionFailed),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Created => 0,
            Self::Active => 1,
            Self::Repaid => 2,
            Self::Defaulted => 3,
            Self::Repaying => 5,
            Self::DisbursementFailed => 6,
            Self::Disbursing => 7,
            Self::CollectionFailed => 8,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Active => "Active",
            Self::Repaid => "Repaid",
            Self::Defaulted => "Defaulted",
            Self::Repaying => "Repaying",
            Self::DisbursementFailed => "DisbursementFailed",
            Self::Disbursing => "Disbursing",
            Self::CollectionFailed => "CollectionFailed",
        }
    }
}

/// Offer policy attached to the loan's originating offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferPolicy {
    TenPercentFee,
    FifteenPercentFee,
    MultiAmountsV1,
    MultiTermsV1,
}

impl OfferPolicy {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::TenPercentFee),
            1 => Some(Self::FifteenPercentFee),
            2 => Some(Self::MultiAmountsV1),
            3 => Some(Self::MultiTermsV1),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::TenPercentFee => 0,
            Self::FifteenPercentFee => 1,
            Self::MultiAmountsV1 => 2,
            Self::MultiTermsV1 => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::TenPercentFee => "TenPercentFee",
            Self::FifteenPercentFee => "FifteenPercentFee",
            Self::MultiAmountsV1 => "MultiAmountsV1",
            Self::MultiTermsV1 => "MultiTermsV1",
        }
    }
}

/// Credit policy that approved the loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditPolicy {
    Belvo,
    Nubarium,
    Statements,
    RepeatBelvo,
    RepeatStatements,
    RepeatControl,
    Avocado,
    AvocadoV2,
    BadAvocadoV2,
    Random,
    BajaV1,
    BajaV2,
    CaboV1,
    CaboGraduation,
    DurangoV1,
    DurangoGraduation,
    DurangoAncho,
    DurangoV2Conservative,
    DurangoV2Aggressive,
}

impl CreditPolicy {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Belvo),
            2 => Some(Self::Nubarium),
            3 => Some(Self::Statements),
            4 => Some(Self::RepeatBelvo),
            5 => Some(Self::RepeatStatements),
            6 => Some(Self::RepeatControl),
            7 => Some(Self::Avocado),
            8 => Some(Self::AvocadoV2),
            9 => Some(Self::BadAvocadoV2),
            10 => Some(Self::Random),
            14 => Some(Self::BajaV1),
            15 => Some(Self::BajaV2),
            16 => Some(Self::CaboV1),
            17 => Some(Self::CaboGraduation),
            18 => Some(Self::DurangoV1),
            19 => Some(Self::DurangoGraduation),
            20 => Some(Self::DurangoAncho),
            21 => Some(Self::DurangoV2Conservative),
            22 => Some(Self::DurangoV2Aggressive),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Belvo => 1,
            Self::Nubarium => 2,
            Self::Statements => 3,
            Self::RepeatBelvo => 4,
            Self::RepeatStatements => 5,
            Self::RepeatControl => 6,
            Self::Avocado => 7,
            Self::AvocadoV2 => 8,
            Self::BadAvocadoV2 => 9,
            Self::Random => 10,
            Self::BajaV1 => 14,
            Self::BajaV2 => 15,
            Self::CaboV1 => 16,
            Self::CaboGraduation => 17,
            Self::DurangoV1 => 18,
            Self::DurangoGraduation => 19,
            Self::DurangoAncho => 20,
            Self::DurangoV2Conservative => 21,
            Self::DurangoV2Aggressive => 22,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Belvo => "Belvo",
            Self::Nubarium => "Nubarium",
            Self::Statements => "Statements",
            Self::RepeatBelvo => "RepeatBelvo",
            Self::RepeatStatements => "RepeatStatements",
            Self::RepeatControl => "RepeatControl",
            Self::Avocado => "Avocado",
            Self::AvocadoV2 => "AvocadoV2",
            Self::BadAvocadoV2 => "BadAvocadoV2",
            Self::Random => "Random",
            Self::BajaV1 => "BajaV1",
            Self::BajaV2 => "BajaV2",
            Self::CaboV1 => "CaboV1",
            Self::CaboGraduation => "CaboGraduation",
            Self::DurangoV1 => "DurangoV1",
            Self::DurangoGraduation => "DurangoGraduation",
            Self::DurangoAncho => "DurangoAncho",
            Self::DurangoV2Conservative => "DurangoV2Conservative",
            Self::DurangoV2Aggressive => "DurangoV2Aggressive",
        }
    }
}

/// First-loan versus repeat-borrower cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanCohort {
    First,
    Repeat,
}

impl LoanCohort {
    pub fn label(self) -> &'static str {
        match self {
            Self::First => "First",
            Self::Repeat => "Repeat",
        }
    }
}

/// A loan as consumed from the upstream extract.
///
/// `due_date` is a civil Mexico City datetime; issue and modification
/// timestamps are UTC instants.
#[derive(Debug, Clone, PartialEq)]
pub struct Loan {
    pub loan_id: LoanId,
    pub borrower_id: BorrowerId,
    pub issued_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub due_date: NaiveDateTime,
    pub principal: f64,
    pub fee: f64,
    pub fee_ratio: Option<f64>,
    pub is_late: bool,
    pub late_fee: f64,
    pub status: LoanStatus,
    pub loan_number: u32,
    pub offer_policy: Option<OfferPolicy>,
    pub credit_policy: Option<CreditPolicy>,
    pub ml_score: Option<f64>,
}

impl Loan {
    /// The per-component amounts the borrower owes.
    pub fn due_breakdown(&self) -> DueBreakdown {
        let late_fee = if self.is_late { self.late_fee } else { 0.0 };
        DueBreakdown {
            principal: self.principal,
            fee: self.fee,
            tax_on_fee: self.fee * IVA_RATE,
            late_fee,
            tax_on_late_fee: late_fee * IVA_RATE,
        }
    }

    pub fn cohort(&self) -> LoanCohort {
        if self.loan_number == 1 {
            LoanCohort::First
        } else {
            LoanCohort::Repeat
        }
    }
}

/// Due amounts split into the apportionment buckets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueBreakdown {
    pub principal: f64,
    pub fee: f64,
    pub tax_on_fee: f64,
    pub late_fee: f64,
    pub tax_on_late_fee: f64,
}

impl DueBreakdown {
    pub fn total(&self) -> f64 {
        self.principal + self.fee + self.tax_on_fee + self.late_fee + self.tax_on_late_fee
    }
}

/// Per-loan per-channel aggregate of completed inbound payments.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelTotals {
    pub amount_paid: f64,
    pub last_paid_at: Option<DateTime<Utc>>,
}

/// Collections strategy catalogue, carrying the upstream numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionStrategy {
    Cmd,
    Integra,
    IvrPreventativeAndReminderCollectionCallV2,
    Vozy,
    AgencyReminderCallV1,
    MoonflowVariationV1,
    MoonflowControlGroupV1,
    MoonflowPaymentCommitmentV1,
    Pypper,
    PypperLate20,
}

/// Pre versus post due-date workflow classification for a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyType {
    PreDueDate,
    PostDueDate,
}

impl StrategyType {
    pub fn label(self) -> &'static str {
        match self {
            Self::PreDueDate => "PreDD",
            Self::PostDueDate => "PostDD",
        }
    }
}

impl CollectionStrategy {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            3 => Some(Self::Cmd),
            4 => Some(Self::Integra),
            5 => Some(Self::IvrPreventativeAndReminderCollectionCallV2),
            7 => Some(Self::Vozy),
            8 => Some(Self::AgencyReminderCallV1),
            10 => Some(Self::MoonflowVariationV1),
            11 => Some(Self::MoonflowControlGroupV1),
            12 => Some(Self::MoonflowPaymentCommitmentV1),
            13 => Some(Self::Pypper),
            14 => Some(Self::PypperLate20),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Cmd => 3,
            Self::Integra => 4,
            Self::IvrPreventativeAndReminderCollectionCallV2 => 5,
            Self::Vozy => 7,
            Self::AgencyReminderCallV1 => 8,
            Self::MoonflowVariationV1 => 10,
            Self::MoonflowControlGroupV1 => 11,
            Self::MoonflowPaymentCommitmentV1 => 12,
            Self::Pypper => 13,
            Self::PypperLate20 => 14,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cmd => "CMD",
            Self::Integra => "Integra",
            Self::IvrPreventativeAndReminderCollectionCallV2 => {
                "IvrPreventativeAndReminderCollectionCallV2"
            }
            Self::Vozy => "Vozy",
            Self::AgencyReminderCallV1 => "AgencyReminderCallV1",
            Self::MoonflowVariationV1 => "MoonflowVariationV1",
            Self::MoonflowControlGroupV1 => "MoonflowControlGroupV1",
            Self::MoonflowPaymentCommitmentV1 => "MoonflowPaymentCommitmentV1",
            Self::Pypper => "Pypper",
            Self::PypperLate20 => "Pypper_late_20",
        }
    }

    pub fn strategy_type(self) -> StrategyType {
        match self {
            Self::IvrPreventativeAndReminderCollectionCallV2 | Self::AgencyReminderCallV1 => {
                StrategyType::PreDueDate
            }
            _ => StrategyType::PostDueDate,
        }
    }

    /// Strategies eligible as a loan's primary post-due-date assignment.
    pub fn is_post_dd_workflow(self) -> bool {
        matches!(
            self,
            Self::Cmd
                | Self::Integra
                | Self::MoonflowVariationV1
                | Self::MoonflowControlGroupV1
                | Self::MoonflowPaymentCommitmentV1
                | Self::Pypper
        )
    }

    /// Strategies whose presence alone marks a loan post due date.
    pub fn is_explicit_post_dd(self) -> bool {
        matches!(self, Self::Cmd | Self::Integra | Self::Pypper)
    }

    /// Auto-assigned experiment arms whose recorded timestamps are noisy.
    pub fn is_auto_assigned_experiment(self) -> bool {
        matches!(
            self,
            Self::MoonflowVariationV1
                | Self::MoonflowControlGroupV1
                | Self::MoonflowPaymentCommitmentV1
        )
    }

    /// The disjoint late-stage test, attached separately from the primary.
    pub fn is_late_stage_test(self) -> bool {
        matches!(self, Self::PypperLate20)
    }
}

/// One collections-strategy assignment row for a loan.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyAssignment {
    pub loan_id: LoanId,
    pub strategy: CollectionStrategy,
    pub assigned_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

/// Primary strategy fallback when no whitelisted assignment survives.
pub const FALLBACK_STRATEGY_NAME: &str = "Twilio";

/// The resolved collections state attached to a reconciled loan.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanCollections {
    pub strategy: Option<CollectionStrategy>,
    pub strategy_name: String,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_at_cdmx: Option<NaiveDateTime>,
    pub late_stage_test: Option<LateStageTest>,
}

/// The optional late-stage test assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct LateStageTest {
    pub strategy: CollectionStrategy,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_at_cdmx: Option<NaiveDateTime>,
}

/// Five apportioned payment buckets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Apportionment {
    pub principal_paid: f64,
    pub fee_paid: f64,
    pub tax_on_fee_paid: f64,
    pub late_fee_paid: f64,
    pub tax_on_late_fee_paid: f64,
}

impl Apportionment {
    pub fn total(&self) -> f64 {
        self.principal_paid
            + self.fee_paid
            + self.tax_on_fee_paid
            + self.late_fee_paid
            + self.tax_on_late_fee_paid
    }
}

/// One analytics-ready output row per loan.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledLoan {
    pub loan: Loan,
    pub arcus: ChannelTotals,
    pub stripe: ChannelTotals,
    pub cash: ChannelTotals,
    pub dispute_amount: f64,
    pub total_amount_due: f64,
    pub total_amount_paid: f64,
    pub total_original_amount_paid: f64,
    pub last_paid_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub settled_at_cdmx: Option<NaiveDateTime>,
    pub days_late: i64,
    pub apportionment: Apportionment,
    pub cohort: LoanCohort,
    pub is_post_dd: bool,
    pub collections: LoanCollections,
}

impl ReconciledLoan {
    pub fn issued_at_cdmx(&self) -> NaiveDateTime {
        time::to_cdmx(self.loan.issued_at)
    }

    pub fn modified_at_cdmx(&self) -> NaiveDateTime {
        time::to_cdmx(self.loan.modified_at)
    }

    pub fn last_paid_at_cdmx(&self) -> Option<NaiveDateTime> {
        self.last_paid_at.map(time::to_cdmx)
    }
}
