//! Blocking HTTP transport for the MediaWiki action API

use std::sync::Mutex;
use std::time::{Duration, Instant};

use glossa_core::{ConfigError, GlossaResult, RemoteConfig, SourceError};
use reqwest::blocking::Client;
use serde_json::Value;

use crate::api::ApiErrorBody;
use crate::retry::{is_retryable_status, Failure, RetryPolicy};

/// Longest server message kept in an error.
const MAX_ERROR_BODY: usize = 300;

/// One `action=query` round trip.
///
/// The seam between response handling and HTTP: sources are generic over
/// it so they can be driven by recorded responses.
pub trait ApiTransport: Send + Sync {
    fn endpoint(&self) -> &str;

    /// Send `params` (without `action`/`format`) and return the JSON body.
    /// API-level errors are already turned into `SourceError`s.
    fn query(&self, params: &[(String, String)]) -> GlossaResult<Value>;
}

pub struct MediaWikiClient {
    http: Client,
    api_url: String,
    policy: RetryPolicy,
    rate_limit: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for MediaWikiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaWikiClient")
            .field("api_url", &self.api_url)
            .field("policy", &self.policy)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl MediaWikiClient {
    pub fn new(config: &RemoteConfig) -> GlossaResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "remote".to_string(),
                value: config.api_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            policy: RetryPolicy::from_config(&config.retry),
            rate_limit: config.rate_limit(),
            last_request: Mutex::new(None),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Wait until `rate_limit` has passed since the previous request.
    fn throttle(&self) {
        if let Ok(mut last) = self.last_request.lock() {
            if let Some(previous) = *last {
                let elapsed = previous.elapsed();
                if elapsed < self.rate_limit {
                    std::thread::sleep(self.rate_limit - elapsed);
                }
            }
            *last = Some(Instant::now());
        }
    }

    fn attempt(&self, params: &[(String, String)]) -> Result<Value, Failure> {
        self.throttle();
        let response = self
            .http
            .get(&self.api_url)
            .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    Failure::Transient(e.to_string())
                } else {
                    Failure::Permanent(self.invalid(e.to_string()))
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            if is_retryable_status(status) {
                return Err(Failure::Transient(format!("status {}", status)));
            }
            let mut message = response.text().unwrap_or_default();
            truncate(&mut message, MAX_ERROR_BODY);
            return Err(Failure::Permanent(
                SourceError::RequestFailed {
                    endpoint: self.api_url.clone(),
                    status,
                    message,
                }
                .into(),
            ));
        }

        let body: Value = response
            .json()
            .map_err(|e| Failure::Permanent(self.invalid(e.to_string())))?;
        check_api_error(&self.api_url, status, &body)?;
        Ok(body)
    }

    fn invalid(&self, reason: String) -> glossa_core::GlossaError {
        SourceError::InvalidResponse {
            endpoint: self.api_url.clone(),
            reason,
        }
        .into()
    }
}

impl ApiTransport for MediaWikiClient {
    fn endpoint(&self) -> &str {
        &self.api_url
    }

    fn query(&self, params: &[(String, String)]) -> GlossaResult<Value> {
        self.policy
            .run(&self.api_url, || self.attempt(params), std::thread::sleep)
    }
}

/// Turn an `error` object in a successful response into a failure.
pub(crate) fn check_api_error(endpoint: &str, status: u16, body: &Value) -> Result<(), Failure> {
    let Some(error) = body.get("error") else {
        return Ok(());
    };
    let error: ApiErrorBody = serde_json::from_value(error.clone()).map_err(|e| {
        Failure::Permanent(
            SourceError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
            .into(),
        )
    })?;
    let message = format!("{}: {}", error.code, error.info);
    if error.is_transient() {
        Err(Failure::Transient(message))
    } else {
        Err(Failure::Permanent(
            SourceError::RequestFailed {
                endpoint: endpoint.to_string(),
                status,
                message,
            }
            .into(),
        ))
    }
}

fn truncate(text: &mut String, max: usize) {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_errors_are_classified() {
        assert_eq!(check_api_error("api", 200, &json!({"query": {}})), Ok(()));

        let lag = json!({"error": {"code": "maxlag", "info": "lagged"}});
        assert!(matches!(check_api_error("api", 200, &lag), Err(Failure::Transient(_))));

        let bad = json!({"error": {"code": "badvalue", "info": "Unrecognized value"}});
        match check_api_error("api", 200, &bad) {
            Err(Failure::Permanent(err)) => assert!(err.to_string().contains("badvalue")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let mut text = "кошка".to_string();
        truncate(&mut text, 3);
        assert_eq!(text, "к");
    }

    #[test]
    fn test_client_builds_from_config() {
        let client = MediaWikiClient::new(&RemoteConfig::default()).unwrap();
        assert!(client.endpoint().starts_with("https://"));
    }
}
