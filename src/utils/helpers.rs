//! Helper functions and utilities
//!
//! This module contains common helper functions used throughout the engine.

use std::sync::OnceLock;
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;

const CHECK_IN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Longest code a scanner is allowed to present
pub const MAX_CHECK_IN_CODE_LENGTH: usize = 32;

/// Generate a random uppercase alphanumeric check-in code
pub fn generate_check_in_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHECK_IN_ALPHABET[rng.gen_range(0..CHECK_IN_ALPHABET.len())] as char)
        .collect()
}

fn check_in_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{1,32}$").expect("check-in code pattern is valid"))
}

/// Normalize a presented check-in code, `None` if it cannot be a valid code
pub fn normalize_check_in_code(code: &str) -> Option<String> {
    let normalized = code.trim().to_uppercase();
    if check_in_code_pattern().is_match(&normalized) {
        Some(normalized)
    } else {
        None
    }
}

/// Format a timestamp for display
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Truncate text to a maximum length with ellipsis
pub fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_length.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Percentage rounded to the nearest integer, 0 when the whole is empty
pub fn percentage(part: i64, whole: i64) -> i64 {
    if whole <= 0 {
        0
    } else {
        ((part as f64 / whole as f64) * 100.0).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_check_in_code() {
        let code = generate_check_in_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(normalize_check_in_code(&code), Some(code));
    }

    #[test]
    fn test_normalize_check_in_code() {
        assert_eq!(normalize_check_in_code("  ab12cd "), Some("AB12CD".to_string()));
        assert_eq!(normalize_check_in_code(""), None);
        assert_eq!(normalize_check_in_code("AB-12"), None);
        assert_eq!(normalize_check_in_code(&"A".repeat(MAX_CHECK_IN_CODE_LENGTH + 1)), None);
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a much longer reason", 10), "a much ...");
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(5, 0), 0);
    }
}
