//! URL utilities for consistent endpoint construction
//!
//! Base URLs come from configuration, environment variables and flags, so
//! they arrive with or without trailing slashes and sometimes already carry
//! the `/api/v1` prefix. Everything that builds a request URL goes through
//! here.

/// Path prefix of every service endpoint.
pub const API_PREFIX: &str = "api/v1";

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use askliam::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:8000/"), "http://localhost:8000");
/// assert_eq!(normalize_base_url("http://localhost:8000///"), "http://localhost:8000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path without doubling slashes
///
/// # Examples
///
/// ```
/// use askliam::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:8000/", "/api/v1/generate"),
///     "http://localhost:8000/api/v1/generate"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Build the URL of a service endpoint, adding the `/api/v1` prefix unless
/// the base URL already ends with it
///
/// # Examples
///
/// ```
/// use askliam::utils::url::service_url;
///
/// assert_eq!(service_url("http://localhost:8000", "generate"), "http://localhost:8000/api/v1/generate");
/// assert_eq!(service_url("http://localhost:8000/api/v1/", "metrics"), "http://localhost:8000/api/v1/metrics");
/// ```
pub fn service_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    if normalized_base.ends_with(&format!("/{API_PREFIX}")) {
        format!("{normalized_base}/{endpoint}")
    } else {
        format!("{normalized_base}/{API_PREFIX}/{endpoint}")
    }
}
