//! HTTP client for the internal workbench executor.
//!
//! The workbench runs native coding executions: create an execution, send
//! the prompt, poll status until it settles (idle/completed/failed), then
//! fetch the final diff. Polling backs off from 2 s by 1.5x up to 30 s; the
//! session's duration budget bounds the whole run.

use crate::executor::resolve_agent_name;
use crate::ports::{ExecutionOutcome, ExecutionPort};
use async_trait::async_trait;
use gantry_core::{GantryResult, Session, TransportError, WorkbenchConfig};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
struct CreatedExecution {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ExecutionStatus {
    status: String,
}

/// Reqwest-backed implementation of [`ExecutionPort`].
pub struct WorkbenchClient {
    http: Client,
    config: WorkbenchConfig,
}

impl WorkbenchClient {
    pub fn new(config: WorkbenchConfig) -> GantryResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent("gantry-orchestrator/0.3")
            .build()
            .map_err(|e| TransportError::Connection {
                endpoint: config.base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> GantryResult<T> {
        let url = self.url(path);
        let mut last_error: Option<gantry_core::GantryError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay * attempt).await;
            }

            let mut request = self.http.request(method.clone(), &url);
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(error) => {
                    let transport: gantry_core::GantryError = if error.is_timeout() {
                        TransportError::Timeout {
                            endpoint: url.clone(),
                            timeout_ms: self.config.timeout.as_millis() as u64,
                        }
                        .into()
                    } else {
                        TransportError::Connection {
                            endpoint: url.clone(),
                            reason: error.to_string(),
                        }
                        .into()
                    };
                    tracing::warn!(url = url.as_str(), attempt, error = %transport, "workbench request failed");
                    last_error = Some(transport);
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                last_error = Some(TransportError::RateLimited { endpoint: url.clone() }.into());
                continue;
            }
            if status.is_server_error() {
                last_error = Some(
                    TransportError::Api {
                        endpoint: url.clone(),
                        status: status.as_u16(),
                        message: response.text().await.unwrap_or_default(),
                    }
                    .into(),
                );
                continue;
            }
            if status.as_u16() == 404 {
                return Err(TransportError::ExecutionNotFound {
                    execution_id: path.to_string(),
                }
                .into());
            }
            if !status.is_success() {
                return Err(TransportError::Api {
                    endpoint: url,
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                }
                .into());
            }

            return response.json::<T>().await.map_err(|e| {
                TransportError::Api {
                    endpoint: url,
                    status: status.as_u16(),
                    message: format!("malformed response: {e}"),
                }
                .into()
            });
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::Connection {
                endpoint: url,
                reason: "exhausted retries".into(),
            }
            .into()
        }))
    }

    async fn poll_until_settled(
        &self,
        execution_id: &str,
        budget: Duration,
    ) -> GantryResult<()> {
        let started = Instant::now();
        let mut interval = self.config.poll_interval;

        loop {
            if started.elapsed() >= budget {
                return Err(TransportError::Timeout {
                    endpoint: format!("execution {execution_id}"),
                    timeout_ms: budget.as_millis() as u64,
                }
                .into());
            }

            let status: ExecutionStatus = self
                .request_json(
                    reqwest::Method::GET,
                    &format!("/session/{execution_id}/status"),
                    None,
                )
                .await?;
            if matches!(status.status.as_str(), "idle" | "completed" | "failed") {
                return Ok(());
            }

            tokio::time::sleep(interval).await;
            interval = Duration::from_secs_f64(
                (interval.as_secs_f64() * 1.5)
                    .min(self.config.poll_interval_max.as_secs_f64()),
            );
        }
    }
}

#[async_trait]
impl ExecutionPort for WorkbenchClient {
    async fn execute(
        &self,
        session: &Session,
        additional_prompt: Option<&str>,
    ) -> GantryResult<ExecutionOutcome> {
        let agent = resolve_agent_name(session);
        let created: CreatedExecution = self
            .request_json(
                reqwest::Method::POST,
                "/session",
                Some(&json!({
                    "title": session.title,
                    "parent_id": session.parent_id.map(|id| id.to_string()),
                    "agent": agent,
                    "model": session.model_identifier,
                })),
            )
            .await?;
        tracing::info!(
            session_id = %session.id,
            execution_id = created.id.as_str(),
            "native execution created"
        );

        let prompt = match additional_prompt {
            Some(extra) => format!("{}\n\n{extra}", session.initial_prompt),
            None => session.initial_prompt.clone(),
        };
        let result: Value = self
            .request_json(
                reqwest::Method::POST,
                &format!("/session/{}/message", created.id),
                Some(&json!({
                    "message": prompt,
                    "agent": agent,
                    "model": session.model_identifier,
                })),
            )
            .await?;

        let budget = Duration::from_secs(session.limits.max_duration_seconds as u64);
        self.poll_until_settled(&created.id, budget).await?;

        let diff: Value = self
            .request_json(
                reqwest::Method::GET,
                &format!("/session/{}/diff", created.id),
                None,
            )
            .await?;

        Ok(ExecutionOutcome {
            execution_id: created.id,
            result,
            diff,
            metrics: json!({
                "api_calls": 3,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        })
    }
}
