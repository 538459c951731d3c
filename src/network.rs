//! Keyserver lookup (HKP).
//!
//! Fetches ASCII-armored keys through the machine-readable HKP interface
//! (`/pks/lookup?op=get&options=mr`).

use std::time::Duration;

use crate::error::{Error, Result};

/// Keyserver used when none is given.
pub const DEFAULT_KEYSERVER: &str = "https://keys.openpgp.org";

/// Request timeout used when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Build the HKP lookup URL for `search`.
pub(crate) fn lookup_url(keyserver: &str, search: &str) -> Result<reqwest::Url> {
    let base = format!("{}/pks/lookup", keyserver.trim_end_matches('/'));
    reqwest::Url::parse_with_params(&base, &[("search", search), ("options", "mr"), ("op", "get")])
        .map_err(|e| Error::InvalidInput(format!("Invalid keyserver URL {}: {}", keyserver, e)))
}

/// Fetch a key from an HKP keyserver.
///
/// # Arguments
/// * `search` - Search term; `0x`-prefixed fingerprints and key IDs, or an email address
/// * `keyserver` - Keyserver URL (defaults to [`DEFAULT_KEYSERVER`])
/// * `timeout` - Request timeout (defaults to [`DEFAULT_TIMEOUT`])
///
/// # Returns
/// The armored key with surrounding whitespace trimmed.
///
/// # Example
/// ```ignore
/// let key = fetch_key("0xA4F388BBB194925AE301F844C52B42177857DD79", None, None)?;
/// ```
pub fn fetch_key(search: &str, keyserver: Option<&str>, timeout: Option<Duration>) -> Result<String> {
    let url = lookup_url(keyserver.unwrap_or(DEFAULT_KEYSERVER), search)?;

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
        .build()
        .map_err(|e| Error::Network(e.to_string()))?;

    tracing::debug!(%url, "fetching key");
    let response = client
        .get(url)
        .send()
        .map_err(|e| Error::Network(e.to_string()))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(Error::KeyNotFound(search.to_string()));
    }
    if !status.is_success() {
        return Err(Error::Network(format!("Keyserver answered {}", status)));
    }

    let body = response.text().map_err(|e| Error::Network(e.to_string()))?;
    Ok(body.trim().to_string())
}
