//! Human-readable rendering of sample values.

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Binary (1024-based) size with two decimals, e.g. `1.00 MB`.
pub fn format_bytes(b: i64) -> String {
    const UNIT: i64 = 1024;
    if b < UNIT {
        return format!("{b} B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = b / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.2} {}B", b as f64 / div as f64, b"KMGTPE"[exp] as char)
}

/// Renders a raw sample value in its declared unit.
///
/// Sub-second durations are truncated to whole micro/milliseconds before
/// printing with two decimals.
pub fn format_sample_value(value: i64, unit: &str) -> String {
    match unit {
        "nanoseconds" => {
            if value >= NANOS_PER_SEC {
                format!("{:.2}s", value as f64 / NANOS_PER_SEC as f64)
            } else if value >= NANOS_PER_MILLI {
                format!("{:.2}ms", (value / NANOS_PER_MILLI) as f64)
            } else if value >= NANOS_PER_MICRO {
                format!("{:.2}us", (value / NANOS_PER_MICRO) as f64)
            } else {
                format!("{value}ns")
            }
        }
        "count" => value.to_string(),
        _ => format!("{value} {unit}"),
    }
}

/// Byte units for `bytes`, otherwise [`format_sample_value`].
pub fn format_value(value: i64, unit: &str) -> String {
    if unit == "bytes" {
        format_bytes(value)
    } else {
        format_sample_value(value, unit)
    }
}

pub fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(format_bytes(i64::MAX), "8.00 EB");
        assert_eq!(format_bytes(-2048), "-2048 B");
    }

    #[test]
    fn durations_pick_magnitude() {
        assert_eq!(format_sample_value(999, "nanoseconds"), "999ns");
        assert_eq!(format_sample_value(1_500, "nanoseconds"), "1.00us");
        assert_eq!(format_sample_value(2_500_000, "nanoseconds"), "2.00ms");
        assert_eq!(format_sample_value(1_500_000_000, "nanoseconds"), "1.50s");
    }

    #[test]
    fn counts_and_unknown_units() {
        assert_eq!(format_sample_value(12, "count"), "12");
        assert_eq!(format_sample_value(12, "widgets"), "12 widgets");
        assert_eq!(format_value(2048, "bytes"), "2.00 KB");
        assert_eq!(format_value(7, "count"), "7");
    }

    #[test]
    fn percentage_of_zero_total_is_zero() {
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(format!("{:.2}", percentage(2048, 3072)), "66.67");
    }
}
