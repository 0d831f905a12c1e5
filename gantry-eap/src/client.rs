//! HTTP client for the External Agent Protocol.
//!
//! Retry policy for task dispatch: up to 3 attempts with exponential
//! backoff (base 1 s, capped at 10 s) on connect errors, timeouts, and 5xx
//! responses. 4xx responses are non-retryable API errors. The health probe
//! never raises; any failure synthesizes an offline heartbeat.

use crate::types::{EapHeartbeat, EapTaskAssignment, EapTaskResult};
use gantry_core::{GantryError, GantryResult, TransportError};
use reqwest::{Client, StatusCode};
use std::time::Duration;

const SEND_TASK_ATTEMPTS: u32 = 3;
const HEALTH_ATTEMPTS: u32 = 2;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Synchronous-in-effect EAP client: one call per dispatched task.
pub struct EapClient {
    http: Client,
    timeout: Duration,
}

impl EapClient {
    /// Build a client with the given per-call deadline (default 30 s at the
    /// config layer).
    pub fn new(timeout: Duration) -> GantryResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("gantry-orchestrator/0.3")
            .build()
            .map_err(|e| TransportError::Connection {
                endpoint: "eap".into(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Dispatch a task to `POST {endpoint_url}/task`.
    pub async fn send_task(
        &self,
        endpoint_url: &str,
        auth_token: &str,
        assignment: &EapTaskAssignment,
    ) -> GantryResult<EapTaskResult> {
        let url = format!("{}/task", endpoint_url.trim_end_matches('/'));
        let mut last_error: Option<GantryError> = None;

        for attempt in 0..SEND_TASK_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }

            match self.send_task_once(&url, auth_token, assignment).await {
                Ok(result) => {
                    tracing::info!(
                        url = url.as_str(),
                        task_id = %assignment.task_id,
                        attempt,
                        "task dispatched to external agent"
                    );
                    return Ok(result);
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!(
                        url = url.as_str(),
                        attempt,
                        %error,
                        "external agent dispatch failed; retrying"
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::Connection {
                endpoint: url,
                reason: "exhausted retries".into(),
            }
            .into()
        }))
    }

    async fn send_task_once(
        &self,
        url: &str,
        auth_token: &str,
        assignment: &EapTaskAssignment,
    ) -> GantryResult<EapTaskResult> {
        let response = self
            .http
            .post(url)
            .header("X-Agent-Token", auth_token)
            .json(assignment)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, &e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<EapTaskResult>()
                .await
                .map_err(|e| {
                    TransportError::Api {
                        endpoint: url.to_string(),
                        status: status.as_u16(),
                        message: format!("malformed task result: {e}"),
                    }
                    .into()
                });
        }

        let message = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            // 5xx is retryable transport trouble
            Err(TransportError::Connection {
                endpoint: url.to_string(),
                reason: format!("status {status}: {message}"),
            }
            .into())
        } else {
            Err(TransportError::Api {
                endpoint: url.to_string(),
                status: status.as_u16(),
                message,
            }
            .into())
        }
    }

    /// Probe `GET {endpoint_url}/health`. Never raises; failures synthesize
    /// an offline heartbeat carrying the error.
    pub async fn check_health(&self, endpoint_url: &str, auth_token: &str) -> EapHeartbeat {
        let url = format!("{}/health", endpoint_url.trim_end_matches('/'));

        for attempt in 0..HEALTH_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }

            let response = match self
                .http
                .get(&url)
                .header("X-Agent-Token", auth_token)
                .send()
                .await
            {
                Ok(response) => response,
                Err(error) => {
                    tracing::warn!(url = url.as_str(), %error, attempt, "health probe failed");
                    if attempt + 1 == HEALTH_ATTEMPTS {
                        return EapHeartbeat::offline(&error.to_string());
                    }
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                if status.is_server_error() && attempt + 1 < HEALTH_ATTEMPTS {
                    continue;
                }
                return EapHeartbeat::offline(&format!("status {status}"));
            }

            match response.json::<EapHeartbeat>().await {
                Ok(heartbeat) => return heartbeat,
                Err(error) => return EapHeartbeat::offline(&format!("malformed body: {error}")),
            }
        }

        EapHeartbeat::offline("unreachable")
    }
}

fn classify_reqwest_error(url: &str, error: &reqwest::Error) -> GantryError {
    if error.is_timeout() {
        TransportError::Timeout {
            endpoint: url.to_string(),
            timeout_ms: 0,
        }
        .into()
    } else if error.is_connect() {
        TransportError::Connection {
            endpoint: url.to_string(),
            reason: error.to_string(),
        }
        .into()
    } else if let Some(status) = error.status() {
        if status == StatusCode::TOO_MANY_REQUESTS {
            TransportError::RateLimited {
                endpoint: url.to_string(),
            }
            .into()
        } else {
            TransportError::Api {
                endpoint: url.to_string(),
                status: status.as_u16(),
                message: error.to_string(),
            }
            .into()
        }
    } else {
        TransportError::Connection {
            endpoint: url.to_string(),
            reason: error.to_string(),
        }
        .into()
    }
}

/// Exponential backoff: base 1 s doubling per attempt, capped at 10 s.
fn backoff(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.as_secs().saturating_mul(1u64 << (attempt - 1).min(8));
    Duration::from_secs(exp).min(BACKOFF_CAP)
}
