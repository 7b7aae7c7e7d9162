//! Small validators shared by the settings loader and the command handlers.
use std::ops::RangeInclusive;

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates that a value is finite and strictly positive, up to `max` inclusive.
pub fn is_positive_up_to(value: f64, max: f64) -> Result<(), &'static str> {
    if value.is_finite() && value > 0.0 && value <= max {
        Ok(())
    } else {
        Err("Value must be positive and not above the limit")
    }
}

/// Validates if a given string is a valid file path.
///
/// # Arguments
///
/// * `path` - The string to validate.
///
/// # Returns
///
/// * `Ok(())` if the file path is valid.
/// * `Err(&'static str)` if the file path is invalid.
pub fn is_valid_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("File path cannot be empty");
    }
    if path.contains('\0') {
        return Err("File path cannot contain null bytes");
    }
    Ok(())
}

/// Parses an `on`/`off` switch argument (also accepts `1`/`0`).
pub fn parse_switch(value: &str) -> Result<bool, &'static str> {
    match value {
        "on" | "1" => Ok(true),
        "off" | "0" => Ok(false),
        _ => Err("Expected 'on' or 'off'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_in_range() {
        assert!(is_in_range(5, 1..=10).is_ok());
        assert!(is_in_range(1, 1..=10).is_ok());
        assert!(is_in_range(10, 1..=10).is_ok());
        assert!(is_in_range(0, 1..=10).is_err());
        assert!(is_in_range(11, 1..=10).is_err());
        assert!(is_in_range(f64::NAN, 0.0..=50.0).is_err());
    }

    #[test]
    fn test_is_positive_up_to() {
        assert!(is_positive_up_to(1.0, 100.0).is_ok());
        assert!(is_positive_up_to(100.0, 100.0).is_ok());
        assert!(is_positive_up_to(0.0, 100.0).is_err());
        assert!(is_positive_up_to(f64::INFINITY, 100.0).is_err());
    }

    #[test]
    fn test_is_valid_path() {
        assert!(is_valid_path("raw.csv").is_ok());
        assert!(is_valid_path("").is_err());
        assert!(is_valid_path("raw\0.csv").is_err());
    }

    #[test]
    fn test_parse_switch() {
        assert_eq!(parse_switch("on"), Ok(true));
        assert_eq!(parse_switch("0"), Ok(false));
        assert!(parse_switch("maybe").is_err());
    }
}
