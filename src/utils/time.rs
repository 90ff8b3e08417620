//! Calendar helpers for epoch-day time axes
//!
//! The engine stores the `time` axis as whole days since 1970-01-01
//! (proleptic Gregorian). Year-window selection only needs the day → year
//! direction; loaders and the synthetic generator need year/month/day →
//! day. Both directions use exact integer arithmetic, valid far beyond
//! the simulation period.

/// Days since 1970-01-01 for a calendar date (proleptic Gregorian).
pub fn epoch_day(year: i32, month: u32, day: u32) -> i64 {
    debug_assert!((1..=12).contains(&month));
    debug_assert!((1..=31).contains(&day));
    let y = i64::from(year) - i64::from(month <= 2);
    let era = y.div_euclid(400);
    let yoe = y - era * 400; // [0, 399]
    let mp = i64::from((month + 9) % 12); // March-based month [0, 11]
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]
    era * 146097 + doe - 719468
}

/// Calendar year containing an epoch day.
pub fn year_of_epoch_day(days: i64) -> i32 {
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = z - era * 146097; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // [0, 399]
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // March-based month [0, 11]
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    (y + i64::from(month <= 2)) as i32
}

/// Epoch days for every day of a calendar year, in order.
pub fn days_of_year(year: i32) -> Vec<i64> {
    let start = epoch_day(year, 1, 1);
    let end = epoch_day(year + 1, 1, 1);
    (start..end).collect()
}
