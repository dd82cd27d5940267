//! Compact duration strings ("2h", "0.5d") used as cache hints.

use std::sync::LazyLock;

use regex::Regex;

use crate::proxy::error::{ProxyError, ProxyResult};

/// Cache duration applied when the route carries no `_<duration>` segment.
pub const DEFAULT_MAX_AGE_SECS: f64 = 2.0 * 604_800.0;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+|\d+\.\d+)(ms|s|m|h|d|w|y)$").expect("duration regex is valid")
});

fn unit_seconds(unit: &str) -> Option<f64> {
    match unit {
        "ms" => Some(0.001),
        "s" => Some(1.0),
        "m" => Some(60.0),
        "h" => Some(3_600.0),
        "d" => Some(86_400.0),
        "w" => Some(604_800.0),
        "y" => Some(31_536_000.0),
        _ => None,
    }
}

/// Convert a duration such as `2h` into seconds.
pub fn process_duration(duration: &str) -> ProxyResult<f64> {
    let captures = DURATION_RE
        .captures(duration)
        .ok_or_else(|| ProxyError::Validation(format!("Invalid duration: {}", duration)))?;

    let unit = &captures[2];
    let multiplier = unit_seconds(unit)
        .ok_or_else(|| ProxyError::Validation(format!("Invalid duration unit: {}", unit)))?;
    let amount: f64 = captures[1]
        .parse()
        .map_err(|_| ProxyError::Validation(format!("Invalid duration: {}", duration)))?;

    Ok(amount * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(process_duration("2h").unwrap(), 7200.0);
        assert_eq!(process_duration("1w").unwrap(), 604_800.0);
        assert_eq!(process_duration("30s").unwrap(), 30.0);
        assert_eq!(process_duration("5m").unwrap(), 300.0);
        assert_eq!(process_duration("1d").unwrap(), 86_400.0);
        assert_eq!(process_duration("1y").unwrap(), 31_536_000.0);
        assert!((process_duration("1500ms").unwrap() - 1.5).abs() < 1e-9);
        assert!((process_duration("0.5d").unwrap() - 43_200.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["0.1ss", "", "h", "2", "2x", "-1h", "1.h", " 2h", "2H"] {
            match process_duration(bad) {
                Err(ProxyError::Validation(msg)) => assert!(msg.contains("Invalid duration")),
                other => panic!("{:?} should be rejected, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_default_is_two_weeks() {
        assert_eq!(DEFAULT_MAX_AGE_SECS, 1_209_600.0);
    }
}
