//! Payment apportionment waterfall.
//!
//! A paid amount is applied against the due buckets in fixed precedence:
//! late fee plus its tax, then fee plus its tax, then principal. A bucket
//! pair is either covered in full or split proportionally at the 16% tax
//! ratio, after which nothing carries forward.

use super::domain::{Apportionment, DueBreakdown, IVA_RATE};

/// Round to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Split what remains of a payment against a fee and its tax.
///
/// Returns the fee portion, the tax portion, and the amount still
/// unapplied. On a partial split the tax portion is the residual after
/// rounding the fee portion, so the two always add back to the remainder.
fn apply_fee_bucket(remaining: f64, fee_due: f64, tax_due: f64) -> (f64, f64, f64) {
    let bucket_due = fee_due + tax_due;
    if remaining >= bucket_due {
        (fee_due, tax_due, remaining - bucket_due)
    } else {
        let fee_paid = round2(remaining / (1.0 + IVA_RATE));
        let tax_paid = round2(remaining - fee_paid);
        (fee_paid, tax_paid, 0.0)
    }
}

/// Apportion a loan's paid total across the five due buckets.
///
/// At most `due.total()` is apportioned; an overpaid excess is reported
/// elsewhere and never lands in a bucket.
pub fn apportion(total_amount_paid: f64, due: &DueBreakdown) -> Apportionment {
    let amount_to_apportion = total_amount_paid.min(due.total());
    let remaining = amount_to_apportion.max(0.0);

    let (late_fee_paid, tax_on_late_fee_paid, remaining) =
        apply_fee_bucket(remaining, due.late_fee, due.tax_on_late_fee);
    let (fee_paid, tax_on_fee_paid, remaining) =
        apply_fee_bucket(remaining, due.fee, due.tax_on_fee);
    let principal_paid = remaining.min(due.principal);

    Apportionment {
        principal_paid,
        fee_paid,
        tax_on_fee_paid,
        late_fee_paid,
        tax_on_late_fee_paid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 0.005;

    fn due(principal: f64, fee: f64, late_fee: f64) -> DueBreakdown {
        DueBreakdown {
            principal,
            fee,
            tax_on_fee: fee * IVA_RATE,
            late_fee,
            tax_on_late_fee: late_fee * IVA_RATE,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn full_payment_fills_every_bucket() {
        let due = due(1000.0, 150.0, 0.0);
        let split = apportion(1174.0, &due);

        assert_close(split.fee_paid, 150.0);
        assert_close(split.tax_on_fee_paid, 24.0);
        assert_close(split.principal_paid, 1000.0);
        assert_close(split.late_fee_paid, 0.0);
        assert_close(split.tax_on_late_fee_paid, 0.0);
    }

    #[test]
    fn late_fee_outranks_fee_and_principal() {
        // 92.8 covers exactly the late fee of 80 plus its 16% tax.
        let due = due(1000.0, 150.0, 80.0);
        let split = apportion(92.8, &due);

        assert_close(split.late_fee_paid, 80.0);
        assert_close(split.tax_on_late_fee_paid, 12.8);
        assert_close(split.fee_paid, 0.0);
        assert_close(split.tax_on_fee_paid, 0.0);
        assert_close(split.principal_paid, 0.0);
    }

    #[test]
    fn partial_late_fee_splits_at_the_tax_ratio() {
        let due = due(1000.0, 150.0, 80.0);
        let split = apportion(58.0, &due);

        assert_close(split.late_fee_paid, 50.0);
        assert_close(split.tax_on_late_fee_paid, 8.0);
        assert_close(split.fee_paid, 0.0);
        assert_close(split.principal_paid, 0.0);
        assert_close(split.total(), 58.0);
    }

    #[test]
    fn partial_fee_tax_is_the_residual_after_rounding() {
        let due = due(1000.0, 150.0, 0.0);
        let split = apportion(100.0, &due);

        assert_close(split.fee_paid, 86.21);
        assert_close(split.tax_on_fee_paid, 13.79);
        assert_close(split.total(), 100.0);
    }

    #[test]
    fn overpayment_is_capped_at_the_due_total() {
        let due = due(1000.0, 150.0, 0.0);
        let split = apportion(1500.0, &due);

        assert_close(split.total(), due.total());
        assert_close(split.principal_paid, 1000.0);
    }

    #[test]
    fn zero_payment_yields_zero_buckets() {
        let due = due(1000.0, 150.0, 80.0);
        let split = apportion(0.0, &due);

        assert_close(split.total(), 0.0);
    }

    #[test]
    fn buckets_never_exceed_their_due_amounts() {
        let due = due(500.0, 120.0, 60.0);
        for paid in [0.0, 33.33, 69.6, 208.8, 400.0, due.total(), 900.0] {
            let split = apportion(paid, &due);
            assert!(split.late_fee_paid <= due.late_fee + EPS);
            assert!(split.tax_on_late_fee_paid <= due.tax_on_late_fee + EPS);
            assert!(split.fee_paid <= due.fee + EPS);
            assert!(split.tax_on_fee_paid <= due.tax_on_fee + EPS);
            assert!(split.principal_paid <= due.principal + EPS);
            assert!(split.principal_paid >= 0.0);
            assert_close(split.total(), paid.min(due.total()));
        }
    }
}
