/// Upper bound of a sanitized percentage.
pub const MAX_PERCENT: u8 = 100;

/// Rounds a raw percentage (ties away from zero) and clamps it into `0..=100`.
///
/// Percent sources occasionally report values outside the legal range, so
/// this never fails: NaN maps to 0, infinities map to the nearest bound.
pub fn sanitize(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    let rounded = value.round();
    if rounded <= 0.0 {
        0
    } else if rounded >= f64::from(MAX_PERCENT) {
        MAX_PERCENT
    } else {
        rounded as u8
    }
}

/// Percentage of `used` relative to `total`; 0 when `total` is 0.
pub fn percent_of(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 * 100.0 / total as f64
}
