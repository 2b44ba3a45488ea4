//! Civil-time helpers for the Mexico City reporting zone.
//!
//! Every settlement and lateness computation happens in one zone. Upstream
//! instants arrive as UTC and are converted here before any subtraction;
//! due dates are already civil Mexico City datetimes and never pass through
//! a conversion.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::Mexico_City;
use chrono_tz::Tz;

/// The single zone used for business reporting.
pub const REPORTING_ZONE: Tz = Mexico_City;

/// Convert a UTC instant to the civil local datetime in the reporting zone.
pub fn to_cdmx(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&REPORTING_ZONE).naive_local()
}

/// Interpret a civil Mexico City datetime as a UTC instant.
///
/// Ambiguous local times (the fall-back hour of the pre-2023 DST calendar)
/// resolve to the earlier instant; nonexistent local times fall back to the
/// raw reading so the conversion stays total.
pub fn cdmx_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    REPORTING_ZONE
        .from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&local))
}

/// Whole days between two civil datetimes, truncated toward zero.
pub fn whole_days_between(later: NaiveDateTime, earlier: NaiveDateTime) -> i64 {
    (later - earlier).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().expect("valid utc")
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .expect("valid date")
            .and_hms_opt(h, min, 0)
            .expect("valid time")
    }

    #[test]
    fn converts_post_dst_era_instants_at_fixed_minus_six() {
        assert_eq!(to_cdmx(utc(2025, 1, 15, 12, 0)), local(2025, 1, 15, 6, 0));
        assert_eq!(to_cdmx(utc(2025, 7, 15, 12, 0)), local(2025, 7, 15, 6, 0));
    }

    #[test]
    fn converts_pre_2023_summer_instants_at_minus_five() {
        // Mexico City still observed DST in September 2022.
        assert_eq!(to_cdmx(utc(2022, 9, 15, 12, 0)), local(2022, 9, 15, 7, 0));
    }

    #[test]
    fn round_trips_a_civil_datetime() {
        let midnight = local(2025, 3, 1, 0, 0);
        assert_eq!(to_cdmx(cdmx_to_utc(midnight)), midnight);
    }

    #[test]
    fn truncates_whole_days_toward_zero() {
        let due = local(2025, 1, 10, 6, 0);
        assert_eq!(whole_days_between(local(2025, 1, 12, 5, 0), due), 1);
        assert_eq!(whole_days_between(local(2025, 1, 12, 7, 0), due), 2);
        assert_eq!(whole_days_between(due, due), 0);
        assert_eq!(whole_days_between(local(2025, 1, 9, 6, 0), due), -1);
    }
}
