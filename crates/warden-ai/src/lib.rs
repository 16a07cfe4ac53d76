//! HTTP adapter for the AI backend port.
//!
//! Single-request client; the provider shape is inferred from the base URL
//! (Ollama-style `/api/chat` vs. OpenAI-compatible `/v1/chat/completions`).
//! A global semaphore caps in-flight requests independently of the anti-spam
//! worker count, so scaling workers up cannot overwhelm the LLM endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::info;

use warden_core::{errors::Error, ports::AiBackend, Result};

pub mod adapters;

use adapters::{
    build_chat_request, build_openai_request, looks_like_ollama, parse_chat_response,
    parse_openai_response,
};

const ERROR_BODY_LIMIT: usize = 2_000;

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub request_timeout: Duration,
    pub concurrency: usize,
}

pub struct HttpBackend {
    cfg: BackendConfig,
    http: reqwest::Client,
    sem: Semaphore,
}

impl HttpBackend {
    pub fn new(cfg: BackendConfig) -> Result<Self> {
        info!(
            base_url = %cfg.base_url,
            model = cfg.model.as_deref().unwrap_or("(default)"),
            concurrency = cfg.concurrency,
            timeout_s = cfg.request_timeout.as_secs(),
            "AI backend configured"
        );

        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("cannot build http client: {e}")))?;

        let sem = Semaphore::new(cfg.concurrency.max(1));
        Ok(Self { cfg, http, sem })
    }
}

#[async_trait]
impl AiBackend for HttpBackend {
    async fn one_shot(&self, prompt: &str, temperature: f64) -> Result<String> {
        let ollama = looks_like_ollama(&self.cfg.base_url);
        let parts = if ollama {
            build_chat_request(
                &self.cfg.base_url,
                self.cfg.model.as_deref(),
                prompt,
                temperature,
            )
        } else {
            build_openai_request(
                &self.cfg.base_url,
                self.cfg.api_key.as_deref(),
                self.cfg.model.as_deref(),
                prompt,
                temperature,
            )
        };

        let _permit = self
            .sem
            .acquire()
            .await
            .map_err(|_| Error::AiHttp("ai request semaphore closed".to_string()))?;

        let mut req = self.http.post(&parts.url).json(&parts.payload);
        if let Some(key) = &parts.bearer {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::AiHttp(format!(
                    "timeout after {}s",
                    self.cfg.request_timeout.as_secs()
                ))
            } else {
                Error::AiHttp(format!("http error: {e}"))
            }
        })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(Error::AiHttp(format!("HTTP {status}: {body}")));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|_| Error::AiResponseFormat("response is not valid JSON".to_string()))?;

        if ollama {
            parse_chat_response(&data)
        } else {
            parse_openai_response(&data)
        }
    }
}
