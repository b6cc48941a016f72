// crmsync/src/client/executor.rs
use std::time::Duration;

use log::{debug, error, warn};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use super::{HttpResponse, Transport};
use crate::errors::{AppError, Result};
use crate::pipeline::Record;

/// Bounded exponential backoff: the wait after failed attempt `n` (0-based) is `base_delay * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(crate::config::DEFAULT_MAX_RETRIES)
    }
}

/// Issues API requests through a [`Transport`], retrying transient failures.
pub struct RequestExecutor<T> {
    transport: T,
    base_url: String,
    policy: RetryPolicy,
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(transport: T, base_url: impl Into<String>, policy: RetryPolicy) -> Self {
        RequestExecutor {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            policy,
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Absolute URL for an API path such as `/crm/v3/objects/invoices/search`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends one request, retrying on 429, any other non-2xx status, and transport errors.
    ///
    /// Returns the decoded body of the first 2xx answer, or
    /// [`AppError::PermanentFailure`] once `max_retries` attempts have failed.
    pub async fn execute(&self, method: Method, url: &str, payload: Option<&Value>) -> Result<Value> {
        let mut last_error = String::from("no attempt made");

        for attempt in 0..self.policy.max_retries {
            debug!("{} {} (attempt {}/{})", method, url, attempt + 1, self.policy.max_retries);
            let delay = self.policy.delay_for(attempt);

            match self.transport.send(method.clone(), url, payload).await {
                Ok(response) if response.is_success() => return decode_body(&response),
                Ok(response) if response.is_rate_limited() => {
                    warn!(
                        "  [!] Rate limit hit on attempt {}/{}. Pausing for {}s...",
                        attempt + 1,
                        self.policy.max_retries,
                        delay.as_secs_f64()
                    );
                    last_error = format!("status 429: {}", response.body);
                }
                Ok(response) => {
                    warn!(
                        "  [!] API error on attempt {}/{}: {} {}. Retrying in {}s...",
                        attempt + 1,
                        self.policy.max_retries,
                        response.status,
                        response.body,
                        delay.as_secs_f64()
                    );
                    last_error = AppError::Status {
                        status: response.status,
                        body: response.body,
                    }
                    .to_string();
                }
                Err(e) => {
                    warn!(
                        "  [!] Network error on attempt {}/{}: {}. Retrying in {}s...",
                        attempt + 1,
                        self.policy.max_retries,
                        e,
                        delay.as_secs_f64()
                    );
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < self.policy.max_retries {
                tokio::time::sleep(delay).await;
            }
        }

        error!(
            "  [!!] FATAL: {} {} failed after {} attempts.",
            method, url, self.policy.max_retries
        );
        Err(AppError::PermanentFailure {
            method: method.to_string(),
            url: url.to_string(),
            attempts: self.policy.max_retries,
            last_error,
        })
    }

    /// Fetches a single object by id with the given properties projected.
    pub async fn get_record(&self, object_type: &str, id: &str, properties: &[String]) -> Result<Record> {
        let mut url = Url::parse(&self.endpoint(&format!("/crm/v3/objects/{}/{}", object_type, id)))?;
        if !properties.is_empty() {
            url.query_pairs_mut().append_pair("properties", &properties.join(","));
        }
        let body = self.execute(Method::GET, url.as_str(), None).await?;
        serde_json::from_value(body).map_err(|e| {
            AppError::InvalidResponse(format!("{} {} returned an unexpected object: {}", object_type, id, e))
        })
    }
}

fn decode_body(response: &HttpResponse) -> Result<Value> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&response.body)?)
}
