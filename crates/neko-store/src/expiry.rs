//! CDN URL expiry detection.
//!
//! Attachment URLs carry an `ex` query parameter holding a hex-encoded unix
//! timestamp after which the CDN stops honoring the URL.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Extract the `ex` expiry timestamp from a CDN URL, if present and valid.
pub fn expiry_timestamp(url: &str) -> Option<u64> {
    let query = url.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or(query);
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("ex=") {
            return u64::from_str_radix(value, 16).ok();
        }
    }
    None
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A URL without a parseable `ex` parameter is treated as expired: there is
/// no way to know its remaining lifetime, and a refresh is cheap.
pub fn is_expired(url: &str) -> bool {
    expires_within(url, Duration::ZERO)
}

/// True when the URL has less than `margin` of lifetime left.
pub fn expires_within(url: &str, margin: Duration) -> bool {
    match expiry_timestamp(url) {
        Some(ex) => ex <= now_unix() + margin.as_secs(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_with_ex(ex: u64) -> String {
        format!(
            "https://cdn.example.com/attachments/1/2/blob?ex={:x}&is=abc&hm=def",
            ex
        )
    }

    #[test]
    fn test_parses_hex_expiry() {
        let url = url_with_ex(0x66aa_1234);
        assert_eq!(expiry_timestamp(&url), Some(0x66aa_1234));
    }

    #[test]
    fn test_missing_or_bad_ex_is_expired() {
        assert!(is_expired("https://cdn.example.com/blob"));
        assert!(is_expired("https://cdn.example.com/blob?is=abc"));
        assert!(is_expired("https://cdn.example.com/blob?ex=zzzz"));
    }

    #[test]
    fn test_past_expiry_is_expired() {
        assert!(is_expired(&url_with_ex(1_000_000)));
    }

    #[test]
    fn test_future_expiry_not_expired() {
        let far_future = now_unix() + 3600;
        assert!(!is_expired(&url_with_ex(far_future)));
    }

    #[test]
    fn test_margin_policy() {
        let soon = now_unix() + 60;
        let url = url_with_ex(soon);
        assert!(!is_expired(&url));
        assert!(expires_within(&url, Duration::from_secs(300)));
        assert!(!expires_within(&url, Duration::from_secs(10)));
    }
}
