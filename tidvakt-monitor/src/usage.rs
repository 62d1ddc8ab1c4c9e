//! Ring buffer capacity labels.

/// Rounds `bytes` up to a power of two and renders it with a binary unit,
/// e.g. `4194304` becomes `"4M"`.
pub fn size_bucket(bytes: usize) -> String {
    let size = bytes.max(1).checked_next_power_of_two().unwrap_or(1 << (usize::BITS - 1));
    const UNITS: [(usize, &str); 3] = [(1 << 30, "G"), (1 << 20, "M"), (1 << 10, "K")];
    for (scale, unit) in UNITS {
        if size >= scale {
            return format!("{}{}", size / scale, unit);
        }
    }
    format!("{size}B")
}

/// Percentage of `size` currently in use, clamped to 100.
pub fn utilisation(used: u64, size: usize) -> f64 {
    if size == 0 {
        return 0.0;
    }
    (used as f64 * 100.0 / size as f64).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets() {
        assert_eq!(size_bucket(4 * 1024 * 1024), "4M");
        assert_eq!(size_bucket(3 * 1024 * 1024), "4M");
        assert_eq!(size_bucket(256 * 1024), "256K");
        assert_eq!(size_bucket(1 << 30), "1G");
        assert_eq!(size_bucket(1000), "1K");
        assert_eq!(size_bucket(100), "128B");
        assert_eq!(size_bucket(0), "1B");
    }

    #[test]
    fn utilisation_is_a_percentage() {
        assert_eq!(utilisation(1024, 4096), 25.0);
        assert_eq!(utilisation(10_000, 4096), 100.0);
        assert_eq!(utilisation(5, 0), 0.0);
    }
}
