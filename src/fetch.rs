// src/fetch.rs
//! Plain HTTP access for README candidates, feeds and deploy hooks.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;

use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
    /// POST a JSON body; returns the response status.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16, FetchError>;
}

pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("techpress/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn check_url(url: &str) -> Result<(), FetchError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(FetchError::InvalidUrl(url.to_string()))
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        check_url(url)?;
        let request_err = |e: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "fetch", error = ?e, url, "http get failed");
                counter!("http_fetch_errors_total").increment(1);
                return Err(request_err(e));
            }
        };
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(request_err)?;
        Ok(FetchResponse { status, body })
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16, FetchError> {
        check_url(url)?;
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(resp.status().as_u16())
    }
}

/// In-memory fetcher: unknown GET urls answer 404.
#[derive(Default)]
pub struct MockFetch {
    routes: Mutex<HashMap<String, Result<FetchResponse, String>>>,
    requested: Mutex<Vec<String>>,
    post_statuses: Mutex<Vec<u16>>,
    posted: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MockFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, resp: FetchResponse) -> Self {
        self.routes.lock().insert(url.to_string(), Ok(resp));
        self
    }

    /// Make `url` fail at the transport level.
    pub fn fail(self, url: &str, message: &str) -> Self {
        self.routes
            .lock()
            .insert(url.to_string(), Err(message.to_string()));
        self
    }

    /// Statuses returned by successive POSTs; 200 once exhausted.
    pub fn post_responses(self, statuses: &[u16]) -> Self {
        self.post_statuses.lock().extend(statuses.iter().rev());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }

    pub fn posted(&self) -> Vec<(String, serde_json::Value)> {
        self.posted.lock().clone()
    }
}

#[async_trait]
impl HttpFetch for MockFetch {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.requested.lock().push(url.to_string());
        match self.routes.lock().get(url) {
            Some(Ok(resp)) => Ok(resp.clone()),
            Some(Err(message)) => Err(FetchError::Request {
                url: url.to_string(),
                message: message.clone(),
            }),
            None => Ok(FetchResponse::status(404)),
        }
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16, FetchError> {
        self.posted.lock().push((url.to_string(), body.clone()));
        Ok(self.post_statuses.lock().pop().unwrap_or(200))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_routes_and_records() {
        let fetch = MockFetch::new()
            .route("https://a.test/x", FetchResponse::ok("hello"))
            .fail("https://a.test/down", "connection refused");

        assert_eq!(fetch.get("https://a.test/x").await.unwrap().body, "hello");
        assert_eq!(fetch.get("https://a.test/missing").await.unwrap().status, 404);
        assert!(fetch.get("https://a.test/down").await.is_err());
        assert_eq!(fetch.requested().len(), 3);
    }

    #[tokio::test]
    async fn post_statuses_are_consumed_in_order() {
        let fetch = MockFetch::new().post_responses(&[500, 502]);
        let body = serde_json::json!({});
        assert_eq!(fetch.post_json("https://hook.test", &body).await.unwrap(), 500);
        assert_eq!(fetch.post_json("https://hook.test", &body).await.unwrap(), 502);
        assert_eq!(fetch.post_json("https://hook.test", &body).await.unwrap(), 200);
    }

    #[test]
    fn non_http_urls_are_rejected() {
        assert!(matches!(check_url("ftp://x"), Err(FetchError::InvalidUrl(_))));
        assert!(check_url("https://x.test").is_ok());
    }
}
