//! Shared utility functions

/// Hash a string with xxh3. Used for URL and content keys.
pub fn fast_hash(s: &str) -> u64 {
    xxhash_rust::xxh3::xxh3_64(s.as_bytes())
}

/// Truncate a string to a maximum length, appending "..." if truncated.
/// Handles multi-byte characters by finding a valid char boundary.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let suffix = "...";
    let target = max_len.saturating_sub(suffix.len());
    let mut end = target;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], suffix)
}

/// Arithmetic mean of a slice of millisecond samples, `None` when empty
pub fn mean_ms(samples: impl IntoIterator<Item = u64>) -> Option<f64> {
    let mut count = 0u64;
    let mut total = 0u64;
    for s in samples {
        count += 1;
        total = total.saturating_add(s);
    }
    (count > 0).then(|| total as f64 / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("abcdefghij", 8), "abcde...");
        let s = "ééééé";
        let t = truncate_str(s, 6);
        assert!(t.ends_with("..."));
    }

    #[test]
    fn fast_hash_is_stable() {
        assert_eq!(fast_hash("https://example.com"), fast_hash("https://example.com"));
        assert_ne!(fast_hash("a"), fast_hash("b"));
    }

    #[test]
    fn mean_of_samples() {
        assert_eq!(mean_ms(Vec::<u64>::new()), None);
        assert_eq!(mean_ms(vec![1000, 3000]), Some(2000.0));
    }
}
