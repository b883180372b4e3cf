//! HTTP transport for the sync pipeline.
//!
//! Grounded on `manager::download::http::HttpDownloader`, adapted from a
//! blocking `reqwest::blocking::Client` GET/Range downloader to an async
//! `reqwest::Client` JSON POST uploader — same shape (one `reqwest::Client`
//! held behind the struct, one fallible `send` method classifying the
//! response), different verb and payload direction.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::store::BoxFuture;

/// Outcome of a single dispatch attempt, classified the way
/// `SyncPipeline::dispatch_one` needs to decide retry vs. pause vs. drop.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// 2xx response, or a 409 returned for a request carrying an
    /// idempotency key (the endpoint already accepted this exact payload).
    Accepted { status: u16 },
    /// 401/403: pipeline should pause until re-authorized.
    Unauthorized { status: u16 },
    /// 4xx other than 401/403: payload is malformed, drop without retry.
    Rejected { status: u16 },
    /// 5xx or transport-level failure: eligible for retry.
    Failed { status: Option<u16>, reason: String },
    /// Request exceeded its deadline.
    Timeout,
}

/// Dyn-compatible transport seam so `SyncPipeline` can be tested with a
/// fake transport instead of a live endpoint.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        idempotency_header: Option<&str>,
        idempotency_key: &str,
        body: &Value,
    ) -> BoxFuture<'_, DispatchOutcome>;
}

/// `reqwest`-backed transport used in production.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        idempotency_header: Option<&str>,
        idempotency_key: &str,
        body: &Value,
    ) -> BoxFuture<'_, DispatchOutcome> {
        let url = url.to_string();
        let headers = headers.clone();
        let has_idempotency_header = idempotency_header.is_some();
        let idempotency_header = idempotency_header.map(|s| s.to_string());
        let idempotency_key = idempotency_key.to_string();
        let body = body.clone();

        Box::pin(async move {
            let mut request = self.client.post(&url).json(&body);
            for (key, value) in &headers {
                request = request.header(key, value);
            }
            if let Some(header_name) = idempotency_header {
                request = request.header(header_name, idempotency_key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if response.status().is_success() {
                        DispatchOutcome::Accepted { status }
                    } else if status == 401 || status == 403 {
                        DispatchOutcome::Unauthorized { status }
                    } else if status == 409 && has_idempotency_header {
                        // The endpoint already accepted this idempotency key on
                        // a prior attempt; treat the conflict as success.
                        DispatchOutcome::Accepted { status }
                    } else if response.status().is_client_error() {
                        DispatchOutcome::Rejected { status }
                    } else {
                        DispatchOutcome::Failed {
                            status: Some(status),
                            reason: format!("server returned {status}"),
                        }
                    }
                }
                Err(err) if err.is_timeout() => DispatchOutcome::Timeout,
                Err(err) => DispatchOutcome::Failed {
                    status: None,
                    reason: err.to_string(),
                },
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Scripted transport for pipeline tests: returns outcomes in order,
    /// repeating the last one once exhausted.
    pub struct ScriptedTransport {
        outcomes: Mutex<Vec<DispatchOutcome>>,
        pub sent: Mutex<Vec<Value>>,
    }

    impl ScriptedTransport {
        pub fn new(outcomes: Vec<DispatchOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send(
            &self,
            _url: &str,
            _headers: &HashMap<String, String>,
            _idempotency_header: Option<&str>,
            _idempotency_key: &str,
            body: &Value,
        ) -> BoxFuture<'_, DispatchOutcome> {
            self.sent.lock().unwrap().push(body.clone());
            let mut outcomes = self.outcomes.lock().unwrap();
            let outcome = if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes
                    .first()
                    .cloned()
                    .unwrap_or(DispatchOutcome::Accepted { status: 200 })
            };
            Box::pin(async move { outcome })
        }
    }
}
