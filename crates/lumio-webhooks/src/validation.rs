//! Delivery URL validation.
//!
//! A malformed URL is a configuration error, but dispatch must never
//! fail the producer: the executor runs this check per attempt and a
//! rejection is classified like any other delivery failure (retry, then
//! dead-letter).

use crate::error::WebhookError;

/// Validate a webhook delivery URL.
///
/// Requires a parseable absolute URL with a host and an `https` scheme
/// (`http` only when `allow_http` is set, for development and tests).
pub fn validate_webhook_url(url: &str, allow_http: bool) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::InvalidUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => {
            return Err(WebhookError::InvalidUrl(
                "Webhook URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(WebhookError::InvalidUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    if parsed.host_str().is_none() {
        return Err(WebhookError::InvalidUrl(
            "URL must have a host".to_string(),
        ));
    }

    Ok(())
}
