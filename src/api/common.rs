//! Common API utilities
//!
//! This module contains shared utilities used across multiple API endpoints.

/// Treat an absent or empty string parameter as missing.
///
/// The platform's clients send form-style payloads where a cleared field
/// arrives as `""`; both shapes must trigger the same missing-field error.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
