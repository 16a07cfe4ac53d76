//! Provider request/response shaping.
//!
//! Two supported shapes: OpenAI-compatible `/v1/chat/completions` and a
//! simple `/api/chat` (Ollama-style) chat endpoint. The provider is inferred
//! from the base URL; everything past shaping goes through the same HTTP
//! path.

use serde_json::{json, Value};

use warden_core::{errors::Error, Result};

/// Everything the HTTP layer needs for one request.
#[derive(Clone, Debug)]
pub struct RequestParts {
    pub url: String,
    pub bearer: Option<String>,
    pub payload: Value,
}

/// Ollama: base_url mentions 11434 or ollama or /api/chat.
pub fn looks_like_ollama(base_url: &str) -> bool {
    let lower = base_url.to_lowercase();
    lower.contains("11434") || lower.contains("ollama") || lower.contains("/api/chat")
}

fn normalize_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// OpenAI-compatible `/v1/chat/completions` request. Accepts a bare host,
/// `…/v1`, or the full path.
pub fn build_openai_request(
    base_url: &str,
    api_key: Option<&str>,
    model: Option<&str>,
    user_text: &str,
    temperature: f64,
) -> RequestParts {
    let base = normalize_url(base_url);
    let url = if base.ends_with("/v1/chat/completions") {
        base
    } else if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    };

    let mut payload = json!({
        "messages": [{"role": "user", "content": user_text}],
        "temperature": temperature,
    });
    if let Some(model) = model {
        payload["model"] = json!(model);
    }

    RequestParts {
        url,
        bearer: api_key.map(str::to_string),
        payload,
    }
}

pub fn parse_openai_response(data: &Value) -> Result<String> {
    let text = data
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            Error::AiResponseFormat("invalid OpenAI /chat/completions response shape".to_string())
        })?;

    if text.trim().is_empty() {
        return Err(Error::AiResponseFormat("empty model output".to_string()));
    }
    Ok(text.to_string())
}

/// Ollama-style `/api/chat` request (non-stream). `keep_alive` keeps the
/// model warm between moderation calls.
pub fn build_chat_request(
    base_url: &str,
    model: Option<&str>,
    user_text: &str,
    temperature: f64,
) -> RequestParts {
    let base = normalize_url(base_url);
    let url = if base.ends_with("/api/chat") {
        base
    } else {
        format!("{base}/api/chat")
    };

    let mut payload = json!({
        "messages": [{"role": "user", "content": user_text}],
        "stream": false,
        "keep_alive": "5m",
        "temperature": temperature,
    });
    if let Some(model) = model {
        payload["model"] = json!(model);
    }

    RequestParts {
        url,
        bearer: None,
        payload,
    }
}

pub fn parse_chat_response(data: &Value) -> Result<String> {
    let text = data
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            Error::AiResponseFormat("invalid /api/chat response shape".to_string())
        })?;

    if text.trim().is_empty() {
        return Err(Error::AiResponseFormat("empty model output".to_string()));
    }
    Ok(text.to_string())
}
