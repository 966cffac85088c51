//! Small helpers shared by config, HTTP and storage code.

use chrono::{SecondsFormat, Utc};

/// Trim optional text, mapping blank values to `None`.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Resource type segment of a FHIR request URL.
///
/// Handles relative (`Patient?name=x`, `Patient/1`) and absolute
/// (`https://host/fhir/Patient/1/_history/2`) URLs; the first path segment
/// starting with an uppercase letter is taken as the type.
pub fn resource_type_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path
        .split_once("://")
        .map_or(path, |(_, rest)| rest.split_once('/').map_or("", |(_, p)| p));
    path.split('/')
        .find(|segment| segment.chars().next().is_some_and(char::is_uppercase))
        .map(ToString::to_string)
}
