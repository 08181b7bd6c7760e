//! Human-authored durations (`H:MM:SS` or `MM:SS`) to seconds.

use chrono::{NaiveTime, Timelike};

/// Parse `HOURS:MINUTES:SECONDS`, falling back to `MINUTES:SECONDS`.
///
/// Returns the total number of seconds, or `None` when neither layout
/// matches. Each component must be a valid clock value (hours 0-23,
/// minutes and seconds 0-59).
#[must_use]
pub fn parse_span(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let time = NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&format!("0:{text}"), "%H:%M:%S"))
        .ok()?;

    // chrono accepts `:60` as a leap second; a duration never has one.
    if time.nanosecond() >= 1_000_000_000 {
        return None;
    }

    Some(f64::from(time.num_seconds_from_midnight()))
}

#[cfg(test)]
mod tests {
    use super::parse_span;
    use proptest::prelude::*;

    #[test]
    fn hours_minutes_seconds() {
        assert_eq!(parse_span("1:02:03"), Some(3723.0));
        assert_eq!(parse_span("00:00:00"), Some(0.0));
        assert_eq!(parse_span("23:59:59"), Some(86_399.0));
    }

    #[test]
    fn minutes_seconds() {
        assert_eq!(parse_span("5:00"), Some(300.0));
        assert_eq!(parse_span("00:45"), Some(45.0));
        assert_eq!(parse_span(" 12:30 "), Some(750.0));
    }

    #[test]
    fn rejects_other_layouts() {
        for bad in ["", "5", "abc", "1:2:3:4", "60:00", "00:60", "24:00:00", "5 min", "-1:00"] {
            assert_eq!(parse_span(bad), None, "{bad:?} should not parse");
        }
    }

    proptest! {
        #[test]
        fn hms_is_exact(h in 0u32..24, m in 0u32..60, s in 0u32..60) {
            let text = format!("{h}:{m:02}:{s:02}");
            prop_assert_eq!(parse_span(&text), Some(f64::from(h * 3600 + m * 60 + s)));
        }

        #[test]
        fn ms_is_exact(m in 0u32..60, s in 0u32..60) {
            let text = format!("{m:02}:{s:02}");
            prop_assert_eq!(parse_span(&text), Some(f64::from(m * 60 + s)));
        }

        #[test]
        fn never_panics(text in "\\PC{0,16}") {
            let _ = parse_span(&text);
        }
    }
}
