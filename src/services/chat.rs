use crate::error::{Result, SessionError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// One turn of a chat exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat/completion contract used by the translation pipeline.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, model: &str, turns: &[ChatTurn]) -> Result<String>;
}

/// JSON chat client posting `{model, messages}`.
///
/// Accepts both response shapes the bridge services reply with:
/// `{message: {content}}` and `{text}`. The structured field wins when
/// both are present; empty strings count as missing.
pub struct HttpChatClient {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpChatClient {
    pub fn new(base_url: &str, path: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(&self, model: &str, turns: &[ChatTurn]) -> Result<String> {
        debug!("Chat request: model={}, {} turns", model, turns.len());

        let body = json!({
            "model": model,
            "messages": turns,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Translation {
                message: format!("request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Translation {
                message: format!(
                    "chat service returned {}: {}",
                    status,
                    super::body_snippet(&body)
                ),
            });
        }

        let value: serde_json::Value =
            response.json().await.map_err(|e| SessionError::Translation {
                message: format!("invalid response body: {}", e),
            })?;

        extract_content(&value).ok_or_else(|| SessionError::Translation {
            message: "response carried neither message content nor text".to_string(),
        })
    }
}

fn extract_content(value: &serde_json::Value) -> Option<String> {
    if let Some(content) = value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
    {
        let trimmed = content.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    value
        .get("text")
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// One recorded call to [`MockChatClient`].
#[derive(Debug, Clone)]
pub struct ChatCall {
    pub model: String,
    pub turns: Vec<ChatTurn>,
}

/// Scriptable chat client for tests.
///
/// Replies are consumed in order; once the script runs out, each call
/// echoes its last user turn.
pub struct MockChatClient {
    script: Arc<Mutex<VecDeque<std::result::Result<String, String>>>>,
    calls: Arc<Mutex<Vec<ChatCall>>>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_reply(self, reply: &str) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(reply.to_string()));
        }
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(message.to_string()));
        }
        self
    }

    /// Handle for inspecting calls after the client moves into a pipeline.
    pub fn calls(&self) -> Arc<Mutex<Vec<ChatCall>>> {
        Arc::clone(&self.calls)
    }
}

impl Default for MockChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, model: &str, turns: &[ChatTurn]) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ChatCall {
                model: model.to_string(),
                turns: turns.to_vec(),
            });
        }

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(SessionError::Translation { message }),
            None => Ok(turns
                .iter()
                .rev()
                .find(|turn| turn.role == "user")
                .map(|turn| turn.content.clone())
                .unwrap_or_default()),
        }
    }
}
