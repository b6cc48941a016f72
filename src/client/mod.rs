// crmsync/src/client/mod.rs
pub(crate) mod executor;

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};

pub use executor::{RequestExecutor, RetryPolicy};

/// Status and raw body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Sends a single request. Implementations never retry.
pub trait Transport {
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<HttpResponse>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(access_token: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|e| AppError::Config(format!("access_token is not a valid header value: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(ReqwestTransport { client })
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<HttpResponse> {
        let mut request = self.client.request(method, url);
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Transport(format!("request to {} timed out", url))
            } else {
                AppError::Http(e)
            }
        })?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// Builds the production executor from the loaded configuration.
pub fn executor_from_config(app_config: &AppConfig) -> Result<RequestExecutor<ReqwestTransport>> {
    let transport = ReqwestTransport::new(
        &app_config.access_token,
        Duration::from_secs(app_config.request_timeout_secs),
    )?;
    Ok(RequestExecutor::new(
        transport,
        app_config.api_base_url.clone(),
        RetryPolicy::new(app_config.max_retries),
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use reqwest::Method;
    use serde_json::Value;
    use tokio::time::Instant;

    use super::{HttpResponse, Transport};
    use crate::errors::{AppError, Result};

    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: Method,
        pub url: String,
        pub body: Option<Value>,
        pub at: Instant,
    }

    /// Replays canned responses in order and records every request it sees.
    #[derive(Default)]
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Result<HttpResponse>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, status: u16, body: Value) -> Self {
            self.push(Ok(HttpResponse { status, body: body.to_string() }))
        }

        pub fn respond_raw(self, status: u16, body: &str) -> Self {
            self.push(Ok(HttpResponse { status, body: body.to_string() }))
        }

        pub fn fail(self, message: &str) -> Self {
            self.push(Err(AppError::Transport(message.to_string())))
        }

        fn push(self, entry: Result<HttpResponse>) -> Self {
            self.script.lock().unwrap().push_back(entry);
            self
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(RecordedRequest {
                method,
                url: url.to_string(),
                body: body.cloned(),
                at: Instant::now(),
            });
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Transport("script exhausted".to_string())))
        }
    }
}
