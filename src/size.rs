//! Human-readable byte counts.

const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];

/// `256 bytes`, `1.0 KB`, `1.5 MB`, ... in powers of 1024, topping out at PB.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} bytes");
    }
    let mut size = bytes as f64 / 1024.0;
    for unit in &UNITS[..UNITS.len() - 1] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} {}", UNITS[UNITS.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0 bytes")]
    #[case(256, "256 bytes")]
    #[case(1023, "1023 bytes")]
    #[case(1024, "1.0 KB")]
    #[case(1536, "1.5 KB")]
    #[case(3 * 1024 * 1024 / 2, "1.5 MB")]
    #[case(5 * 1024 * 1024 * 1024, "5.0 GB")]
    #[case(1 << 40, "1.0 TB")]
    #[case(1 << 50, "1.0 PB")]
    #[case(1 << 60, "1024.0 PB")]
    fn test_format_size(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_size(bytes), expected);
    }
}
