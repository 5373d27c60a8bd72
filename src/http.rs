#![forbid(unsafe_code)]

//! Minimal blocking HTTP seam used by the thumbnail resolver.
//!
//! Only HEAD and GET are needed. The trait exists so the resolver can be
//! driven by a scripted client in tests and by `ureq` everywhere else.

use std::io::Read;
use std::time::Duration;

use thiserror::Error;

/// Upper bound for a single downloaded body. Thumbnails are a few hundred KiB.
const MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("{url} returned an empty body")]
    EmptyBody { url: String },
    #[error("{url} body exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },
}

/// What a HEAD request tells us about a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadInfo {
    pub content_length: Option<u64>,
}

pub trait HttpClient {
    /// Issues a HEAD request. Anything other than a 200 is an error.
    fn head(&self, url: &str) -> Result<HeadInfo, FetchError>;

    /// Issues a GET request and returns the full, non-empty body of a 200.
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// `HttpClient` backed by a shared `ureq` agent.
#[derive(Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(user_agent)
            .build();
        Self { agent }
    }

    fn call(&self, request: ureq::Request, url: &str) -> Result<ureq::Response, FetchError> {
        match request.call() {
            Ok(response) if response.status() == 200 => Ok(response),
            Ok(response) => Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            }),
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            Err(ureq::Error::Transport(transport)) => Err(FetchError::Transport {
                url: url.to_string(),
                message: transport.to_string(),
            }),
        }
    }
}

impl HttpClient for UreqClient {
    fn head(&self, url: &str) -> Result<HeadInfo, FetchError> {
        let response = self.call(self.agent.head(url), url)?;
        Ok(HeadInfo {
            content_length: parse_content_length(response.header("Content-Length")),
        })
    }

    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.call(self.agent.get(url), url)?;
        read_body(response.into_reader(), url, MAX_BODY_BYTES)
    }
}

/// Reads at most `limit` bytes; one byte more means the body is rejected
/// rather than truncated.
fn read_body(reader: impl Read, url: &str, limit: u64) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut body)
        .map_err(|err| FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        })?;
    if body.len() as u64 > limit {
        return Err(FetchError::TooLarge {
            url: url.to_string(),
            limit,
        });
    }
    if body.is_empty() {
        return Err(FetchError::EmptyBody {
            url: url.to_string(),
        });
    }
    Ok(body)
}

fn parse_content_length(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_parses_plain_numbers() {
        assert_eq!(parse_content_length(Some("1300")), Some(1300));
        assert_eq!(parse_content_length(Some(" 42 ")), Some(42));
    }

    #[test]
    fn content_length_rejects_garbage() {
        assert_eq!(parse_content_length(None), None);
        assert_eq!(parse_content_length(Some("")), None);
        assert_eq!(parse_content_length(Some("-5")), None);
        assert_eq!(parse_content_length(Some("12kb")), None);
    }

    #[test]
    fn fetch_errors_name_the_url() {
        let err = FetchError::Status {
            url: "https://i.ytimg.com/vi/x/default.jpg".into(),
            status: 404,
        };
        let text = err.to_string();
        assert!(text.contains("default.jpg"));
        assert!(text.contains("404"));
    }

    #[test]
    fn body_at_the_limit_is_kept() {
        let body = read_body(&[7u8; 16][..], "https://x/a.jpg", 16).unwrap();
        assert_eq!(body.len(), 16);
    }

    #[test]
    fn body_over_the_limit_is_rejected_not_truncated() {
        let err = read_body(&[7u8; 17][..], "https://x/a.jpg", 16).unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 16, .. }));
    }

    #[test]
    fn empty_body_is_an_error() {
        let err = read_body(&[0u8; 0][..], "https://x/a.jpg", 16).unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody { .. }));
    }
}
