//! Cache key derivation.
//!
//! Canonicalizes a resource path plus query parameters so that parameter
//! order and cache-busting query noise never fragment the key space.

use std::collections::HashMap;

/// Query parameters that never participate in key derivation.
///
/// Clients append these to bust intermediary caches; two requests that
/// differ only in them are the same resource.
pub const VOLATILE_PARAMS: &[&str] = &["_t", "timestamp", "nocache"];

/// Derive the canonical cache key for a path and its query parameters.
///
/// Volatile parameters and parameters without a value are dropped, the
/// rest are sorted lexicographically and rendered as `k=v` pairs. The
/// query string is appended only when at least one pair survives.
pub fn derive_key(path: &str, params: &HashMap<String, Option<String>>) -> String {
    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .filter(|(name, _)| !VOLATILE_PARAMS.contains(&name.as_str()))
        .filter_map(|(name, value)| value.as_deref().map(|v| (name.as_str(), v)))
        .collect();

    if pairs.is_empty() {
        return path.to_string();
    }

    pairs.sort_unstable();
    let query = pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    format!("{path}?{query}")
}

/// Fold a key into a short base-36 digest.
///
/// Extension point for key-space distribution (sharded stores, compact
/// diagnostic labels). Not used by the primary lookup path.
pub fn digest_key(key: &str) -> String {
    let mut hash: i32 = 0;
    for ch in key.chars() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(ch as i32);
    }
    to_base36(hash.unsigned_abs())
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, Option<&str>)]) -> HashMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.map(str::to_string)))
            .collect()
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let a = derive_key("/x", &params(&[("b", Some("2")), ("a", Some("1"))]));
        let b = derive_key("/x", &params(&[("a", Some("1")), ("b", Some("2"))]));
        assert_eq!(a, "/x?a=1&b=2");
        assert_eq!(a, b);
    }

    #[test]
    fn volatile_params_are_dropped() {
        let key = derive_key(
            "/x",
            &params(&[
                ("b", Some("2")),
                ("a", Some("1")),
                ("_t", Some("999")),
                ("timestamp", Some("170000")),
                ("nocache", Some("1")),
            ]),
        );
        assert_eq!(key, "/x?a=1&b=2");
    }

    #[test]
    fn absent_values_are_dropped() {
        let key = derive_key("/x", &params(&[("a", Some("1")), ("b", None)]));
        assert_eq!(key, "/x?a=1");
    }

    #[test]
    fn no_surviving_params_means_bare_path() {
        assert_eq!(derive_key("/comics", &params(&[])), "/comics");
        assert_eq!(
            derive_key("/comics", &params(&[("_t", Some("1"))])),
            "/comics"
        );
    }

    #[test]
    fn digest_is_stable_and_base36() {
        let digest = digest_key("/api/comics?genre=action");
        assert_eq!(digest, digest_key("/api/comics?genre=action"));
        assert!(!digest.is_empty());
        assert!(digest.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn digest_of_empty_key() {
        assert_eq!(digest_key(""), "0");
    }
}
