//! Translation of GitHub error responses into [`RemoteError`].

use std::time::Duration;

use chrono::Utc;
use pipeline::RemoteError;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

const RETRY_AFTER: &str = "retry-after";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Longest error body text carried into an error message.
const MAX_MESSAGE_CHARS: usize = 500;

/// Maps a non-success response to a [`RemoteError`].
///
/// `resource` names what was requested, for `NotFound` messages.
pub(crate) fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    resource: &str,
) -> RemoteError {
    let message = error_message(body);
    let code = status.as_u16();

    match code {
        401 => RemoteError::Unauthorized {
            status: code,
            message,
        },
        403 if rate_limit_exhausted(headers, &message) => RemoteError::RateLimited {
            retry_after: retry_delay(headers),
        },
        403 => RemoteError::Unauthorized {
            status: code,
            message,
        },
        404 => RemoteError::NotFound {
            resource: resource.to_owned(),
        },
        409 => RemoteError::Conflict { message },
        422 if message.to_ascii_lowercase().contains("already exists") => {
            RemoteError::AlreadyExists { message }
        }
        429 => RemoteError::RateLimited {
            retry_after: retry_delay(headers),
        },
        500..=599 => RemoteError::Server {
            status: code,
            message,
        },
        _ => RemoteError::Rejected {
            status: code,
            message,
        },
    }
}

/// Joins the top-level `message` with any `errors[].message` entries.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().chars().take(MAX_MESSAGE_CHARS).collect();
    };

    let mut parts: Vec<&str> = Vec::new();
    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        parts.push(message);
    }
    if let Some(errors) = value.get("errors").and_then(|e| e.as_array()) {
        for entry in errors {
            let detail = entry
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| entry.as_str());
            if let Some(detail) = detail {
                parts.push(detail);
            }
        }
    }
    parts.join("; ")
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn rate_limit_exhausted(headers: &HeaderMap, message: &str) -> bool {
    header(headers, RATE_LIMIT_REMAINING) == Some("0")
        || headers.contains_key(RETRY_AFTER)
        || message.to_ascii_lowercase().contains("rate limit")
}

/// Delay before the next attempt: `Retry-After` seconds, else the time until
/// `X-RateLimit-Reset`.
fn retry_delay(headers: &HeaderMap) -> Option<Duration> {
    if let Some(seconds) = header(headers, RETRY_AFTER).and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(seconds));
    }
    let reset = header(headers, RATE_LIMIT_RESET)?.trim().parse::<i64>().ok()?;
    let wait = reset - Utc::now().timestamp();
    Some(Duration::from_secs(u64::try_from(wait).unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn classify_code(code: u16, pairs: &[(&'static str, &'static str)], body: &str) -> RemoteError {
        classify(
            StatusCode::from_u16(code).unwrap(),
            &headers(pairs),
            body,
            "thing",
        )
    }

    #[test]
    fn duplicate_pull_request_is_already_exists() {
        let body = r#"{"message":"Validation Failed","errors":[{"resource":"PullRequest","code":"custom","message":"A pull request already exists for acme:autodoc-readme-update-1."}]}"#;
        assert!(matches!(
            classify_code(422, &[], body),
            RemoteError::AlreadyExists { .. }
        ));
    }

    #[test]
    fn existing_reference_is_already_exists() {
        let body = r#"{"message":"Reference already exists"}"#;
        assert!(matches!(
            classify_code(422, &[], body),
            RemoteError::AlreadyExists { .. }
        ));
    }

    #[test]
    fn other_validation_failures_are_rejected() {
        let body = r#"{"message":"Validation Failed","errors":[{"message":"No commits between main and x"}]}"#;
        match classify_code(422, &[], body) {
            RemoteError::Rejected { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Validation Failed; No commits between main and x");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn forbidden_is_unauthorized_unless_rate_limited() {
        assert!(matches!(
            classify_code(403, &[], r#"{"message":"Resource not accessible by integration"}"#),
            RemoteError::Unauthorized { status: 403, .. }
        ));
        assert_eq!(
            classify_code(
                403,
                &[("x-ratelimit-remaining", "0"), ("retry-after", "7")],
                r#"{"message":"API rate limit exceeded"}"#
            ),
            RemoteError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[test]
    fn too_many_requests_honours_retry_after() {
        assert_eq!(
            classify_code(429, &[("retry-after", "3")], ""),
            RemoteError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );
        assert_eq!(
            classify_code(429, &[], ""),
            RemoteError::RateLimited { retry_after: None }
        );
    }

    #[test]
    fn remaining_codes() {
        assert!(matches!(classify_code(401, &[], ""), RemoteError::Unauthorized { status: 401, .. }));
        assert_eq!(
            classify_code(404, &[], r#"{"message":"Not Found"}"#),
            RemoteError::NotFound {
                resource: "thing".into()
            }
        );
        assert!(matches!(classify_code(409, &[], ""), RemoteError::Conflict { .. }));
        assert!(matches!(classify_code(502, &[], "<html>"), RemoteError::Server { status: 502, .. }));
        assert!(matches!(classify_code(400, &[], ""), RemoteError::Rejected { status: 400, .. }));
    }

    #[test]
    fn non_json_bodies_are_kept_as_text() {
        assert_eq!(error_message("  upstream timeout \n"), "upstream timeout");
    }
}
