use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{CreatePipeRequest, CreatePipeResponse, Message, PipeRequest, PipeResponse};
use crate::config::{LangbaseConfig, RequestConfig};
use crate::error::{LangbaseError, LangbaseResult};
use crate::prompts::PIPE_SYSTEM_PROMPT;

/// Model installed on the pipe when it is created.
const PIPE_MODEL: &str = "openai:gpt-4o-mini";

/// HTTP client for the Langbase Pipes API.
///
/// Pipe runs are retried with exponential backoff; pipe creation is not.
#[derive(Clone)]
pub struct LangbaseClient {
    http: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl LangbaseClient {
    /// Create a new Langbase client
    pub fn new(config: &LangbaseConfig, request_config: RequestConfig) -> LangbaseResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LangbaseError::Http)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a pipe, retrying failed attempts.
    ///
    /// Every failure (transport, non-2xx, undecodable body, `success=false`)
    /// is retried up to `max_retries` times and then reported as
    /// [`LangbaseError::Unavailable`].
    pub async fn call_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        let mut attempts: u32 = 0;
        let mut last_error = None;

        while attempts <= self.request_config.max_retries {
            if attempts > 0 {
                let delay = self.backoff(attempts);
                warn!(
                    pipe = %request.name,
                    retry = attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying Langbase request"
                );
                tokio::time::sleep(delay).await;
            }
            attempts += 1;

            let start = Instant::now();
            match self.run_once(&request).await {
                Ok(response) => {
                    info!(
                        pipe = %request.name,
                        latency_ms = start.elapsed().as_millis(),
                        tool_calls = response.tool_calls().len(),
                        "Langbase pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        pipe = %request.name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        attempt = attempts,
                        "Langbase pipe call failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(LangbaseError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt was made".to_string()),
            retries: attempts,
        })
    }

    /// Delay before retry number `retry` (1-based): `retry_delay_ms * 2^(retry-1)`.
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 2_u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.request_config.retry_delay_ms.saturating_mul(factor))
    }

    async fn run_once(&self, request: &PipeRequest) -> LangbaseResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "Calling Langbase pipe"
        );

        let response: PipeResponse = self.post_json("/v1/pipes/run", request).await?;
        if !response.success {
            return Err(LangbaseError::InvalidResponse {
                message: "Pipe reported success=false".to_string(),
            });
        }
        Ok(response)
    }

    /// Create (or, with upsert, update) a pipe
    pub async fn create_pipe(
        &self,
        request: CreatePipeRequest,
    ) -> LangbaseResult<CreatePipeResponse> {
        info!(pipe = %request.name, "Creating Langbase pipe");

        let created: CreatePipeResponse = self.post_json("/v1/pipes", &request).await?;
        info!(pipe = %created.name, url = %created.url, "Pipe created successfully");
        Ok(created)
    }

    /// Make sure `pipe_name` exists with the reasoning system prompt.
    ///
    /// A 409 conflict means the pipe is already there and counts as success.
    pub async fn ensure_pipe(&self, pipe_name: &str) -> LangbaseResult<()> {
        let request = CreatePipeRequest::new(pipe_name)
            .with_description("Reasoning orchestrator backend")
            .with_model(PIPE_MODEL)
            .with_upsert(true)
            .with_temperature(0.7)
            .with_max_tokens(2000)
            .with_messages(vec![Message::system(PIPE_SYSTEM_PROMPT)]);

        match self.create_pipe(request).await {
            Ok(_) => {
                info!(pipe = %pipe_name, "Reasoning pipe ready");
                Ok(())
            }
            Err(LangbaseError::Api { status: 409, .. }) => {
                info!(pipe = %pipe_name, "Pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// POST `body` to `path` and decode a JSON reply.
    async fn post_json<B, R>(&self, path: &str, body: &B) -> LangbaseResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("Failed to decode {} response: {}", path, e),
            })
    }

    fn map_send_error(&self, e: reqwest::Error) -> LangbaseError {
        if e.is_timeout() {
            LangbaseError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else {
            LangbaseError::Http(e)
        }
    }
}
