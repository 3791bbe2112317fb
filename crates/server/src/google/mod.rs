//! Google Workspace clients: OAuth service-account tokens, Calendar v3 and
//! Sheets v4.

pub mod auth;
pub mod calendar;
pub mod sheets;

use reqwest::{Response, Url};
use showings_core::errors::ProviderError;

pub(crate) fn transport_error(error: reqwest::Error) -> ProviderError {
    ProviderError::Transport(error.to_string())
}

/// Passes successful responses through; anything else becomes a status error
/// carrying the response body.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status { status: status.as_u16(), body })
}

/// `base` with each segment appended percent-encoded.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url, ProviderError> {
    let mut url = Url::parse(base)
        .map_err(|error| ProviderError::Transport(format!("invalid base url `{base}`: {error}")))?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::Transport(format!("base url `{base}` cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
