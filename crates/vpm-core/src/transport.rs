//! Network capability (spec §6): a blocking HTTP client with the retry policy
//! spec §4.2/§9 spells out — up to 3 attempts, `2^attempt` seconds of
//! backoff, and a timeout that depends on what's being fetched. Generalizes
//! the teacher's `http_client::HttpClient`, which used a millisecond backoff
//! env knob instead of the spec's fixed exponential-seconds schedule.

use std::io::Read;
use std::time::Duration;

use crate::error::PmError;

/// What kind of resource a request is for, since metadata and tarball
/// fetches get different timeouts (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Metadata,
    Tarball,
}

impl ResourceKind {
    fn timeout(self) -> Duration {
        match self {
            ResourceKind::Metadata => Duration::from_secs(10),
            ResourceKind::Tarball => Duration::from_secs(60),
        }
    }
}

pub const MAX_ATTEMPTS: u32 = 3;

fn backoff_for(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// A conditional GET result: either a fresh body plus its ETag, or a signal
/// that the server returned 304 against the ETag we sent.
pub enum ConditionalResponse {
    Fresh { body: Vec<u8>, etag: Option<String> },
    NotModified,
}

/// Blocking HTTP client wrapping a `ureq::Agent`, retrying transient
/// failures (network errors, 5xx, 429) per the spec's backoff schedule.
pub struct Transport {
    agent: ureq::Agent,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .build();
        Self { agent }
    }

    /// GETs `url`, retrying per the spec's policy. `accept` sets the Accept
    /// header (used for npm's abbreviated packument media type).
    pub fn get(&self, url: &str, kind: ResourceKind, accept: Option<&str>, bearer: Option<&str>) -> Result<Vec<u8>, PmError> {
        self.send_with_retry(url, kind, |agent| {
            let mut req = agent.get(url).timeout(kind.timeout());
            if let Some(a) = accept {
                req = req.set("Accept", a);
            }
            if let Some(token) = bearer {
                req = req.set("Authorization", &format!("Bearer {}", token));
            }
            req.call()
        })
    }

    /// GETs `url` with `If-None-Match: etag`, returning `NotModified` on 304.
    pub fn get_conditional(
        &self,
        url: &str,
        etag: Option<&str>,
        bearer: Option<&str>,
    ) -> Result<ConditionalResponse, PmError> {
        let attempt_once = |agent: &ureq::Agent| {
            let mut req = agent.get(url).timeout(ResourceKind::Metadata.timeout());
            if let Some(tag) = etag {
                req = req.set("If-None-Match", tag);
            }
            if let Some(token) = bearer {
                req = req.set("Authorization", &format!("Bearer {}", token));
            }
            req.call()
        };

        let mut last_err = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            match attempt_once(&self.agent) {
                Ok(resp) => {
                    let new_etag = resp.header("ETag").map(|s| s.to_string());
                    let mut body = Vec::new();
                    resp.into_reader().read_to_end(&mut body).map_err(|e| PmError::NetworkError {
                        url: url.to_string(),
                        message: e.to_string(),
                    })?;
                    return Ok(ConditionalResponse::Fresh { body, etag: new_etag });
                }
                Err(ureq::Error::Status(304, _)) => return Ok(ConditionalResponse::NotModified),
                Err(ureq::Error::Status(code, _)) if is_retryable_status(code) && attempt + 1 < MAX_ATTEMPTS => {
                    last_err = format!("HTTP {}", code);
                    std::thread::sleep(backoff_for(attempt));
                }
                Err(ureq::Error::Status(code, _)) => {
                    return Err(PmError::NetworkError { url: url.to_string(), message: format!("HTTP {}", code) });
                }
                Err(e) => {
                    if attempt + 1 < MAX_ATTEMPTS {
                        last_err = e.to_string();
                        std::thread::sleep(backoff_for(attempt));
                    } else {
                        return Err(PmError::NetworkError { url: url.to_string(), message: e.to_string() });
                    }
                }
            }
        }
        Err(PmError::NetworkError { url: url.to_string(), message: last_err })
    }

    fn send_with_retry<F>(&self, url: &str, kind: ResourceKind, mut send: F) -> Result<Vec<u8>, PmError>
    where
        F: FnMut(&ureq::Agent) -> Result<ureq::Response, ureq::Error>,
    {
        let _ = kind;
        let mut last_err = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            match send(&self.agent) {
                Ok(resp) => {
                    let mut body = Vec::new();
                    resp.into_reader().read_to_end(&mut body).map_err(|e| PmError::NetworkError {
                        url: url.to_string(),
                        message: e.to_string(),
                    })?;
                    return Ok(body);
                }
                Err(ureq::Error::Status(code, _)) if is_retryable_status(code) && attempt + 1 < MAX_ATTEMPTS => {
                    last_err = format!("HTTP {}", code);
                    std::thread::sleep(backoff_for(attempt));
                }
                Err(ureq::Error::Status(code, _)) => {
                    return Err(PmError::NetworkError { url: url.to_string(), message: format!("HTTP {}", code) });
                }
                Err(e) => {
                    if attempt + 1 < MAX_ATTEMPTS {
                        last_err = e.to_string();
                        std::thread::sleep(backoff_for(attempt));
                    } else {
                        return Err(PmError::NetworkError { url: url.to_string(), message: e.to_string() });
                    }
                }
            }
        }
        Err(PmError::NetworkError { url: url.to_string(), message: last_err })
    }
}

fn is_retryable_status(code: u16) -> bool {
    code == 429 || (500..600).contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_in_seconds() {
        assert_eq!(backoff_for(0), Duration::from_secs(1));
        assert_eq!(backoff_for(1), Duration::from_secs(2));
        assert_eq!(backoff_for(2), Duration::from_secs(4));
    }

    #[test]
    fn retryable_status_covers_429_and_5xx() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn resource_kind_timeouts_differ() {
        assert!(ResourceKind::Tarball.timeout() > ResourceKind::Metadata.timeout());
    }
}
