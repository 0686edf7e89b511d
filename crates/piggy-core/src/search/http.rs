//! HTTP search capability backend
//!
//! Talks to a web-search capability endpoint with an Ollama-style wire
//! shape: a JSON request carrying the model id and prompt, answered either
//! by a single JSON object or, when streaming, by newline-delimited JSON
//! objects each carrying a text fragment, the last one flagged `done`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};

use super::{SearchBackend, SearchOutcome};

/// Hard deadline for one capability call.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// HTTP client for the web-search capability
#[derive(Clone)]
pub struct HttpSearchBackend {
    http_client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    calls_made: Option<i64>,
}

impl HttpSearchBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(CALL_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables; None when the host is unset.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("PIGGY_SEARCH_HOST").ok()?;
        let model =
            std::env::var("PIGGY_SEARCH_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self::new(&host, &model))
    }

    fn classify(err: reqwest::Error) -> Error {
        if err.is_timeout() {
            // A capability that overruns its deadline counts as unavailable
            Error::CapabilityUnavailable(format!("search call timed out: {}", err))
        } else {
            Error::CapabilityUnavailable(format!("search transport error: {}", err))
        }
    }

    fn classify_status(status: StatusCode) -> Error {
        if status == StatusCode::TOO_MANY_REQUESTS {
            Error::CapabilityQuota(format!("search capability returned {}", status))
        } else {
            Error::CapabilityUnavailable(format!("search capability returned {}", status))
        }
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn run(&self, prompt: &str) -> Result<SearchOutcome> {
        let request = SearchRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/search", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify_status(status));
        }

        let body: SearchResponse = response.json().await.map_err(Self::classify)?;
        debug!(model = %self.model, chars = body.response.len(), "Search capability responded");

        Ok(SearchOutcome {
            final_text: body.response,
            calls_made: body.calls_made.unwrap_or(1),
        })
    }

    async fn run_stream(
        &self,
        prompt: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<SearchOutcome> {
        let request = SearchRequest {
            model: &self.model,
            prompt,
            stream: true,
        };

        let mut response = self
            .http_client
            .post(format!("{}/api/search", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify_status(status));
        }

        let mut final_text = String::new();
        let mut calls_made = 1;
        let mut buffer = String::new();

        while let Some(bytes) = response.chunk().await.map_err(Self::classify)? {
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // Complete lines only; a partial line stays buffered
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);
                if line.is_empty() {
                    continue;
                }

                let parsed: SearchResponse = serde_json::from_str(&line)
                    .map_err(|e| Error::Parse(format!("bad stream frame: {}", e)))?;

                if !parsed.response.is_empty() {
                    final_text.push_str(&parsed.response);
                    if chunks.send(parsed.response).await.is_err() {
                        return Err(Error::Cancelled("chunk consumer went away".to_string()));
                    }
                }
                if let Some(calls) = parsed.calls_made {
                    calls_made = calls;
                }
                if parsed.done {
                    return Ok(SearchOutcome {
                        final_text,
                        calls_made,
                    });
                }
            }
        }

        Ok(SearchOutcome {
            final_text,
            calls_made,
        })
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
