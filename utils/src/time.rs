//! Time formatting helpers.

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::format_duration;

    #[test]
    fn picks_the_two_largest_units() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(3 * 60 + 5), "3m 5s");
        assert_eq!(format_duration(2 * 3600 + 30 * 60), "2h 30m");
        assert_eq!(format_duration(7 * 86400 + 3600), "7d 1h");
    }
}
