use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LanguageModel, Prompt};
use crate::error::GenerationError;

/// Ollama chat endpoint client.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    seed: Option<u64>,
    timeout: Duration,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
}

impl OllamaClient {
    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f32,
        seed: Option<u64>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Ollama HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            seed,
            timeout,
        })
    }

    fn request<'a>(&'a self, prompt: &Prompt) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
                seed: self.seed,
            },
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout)
                } else {
                    GenerationError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Unavailable(format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(GenerationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            GenerationError::Unavailable(format!("malformed chat response: {e}"))
        })?;
        debug!(
            model = %self.model,
            answer_len = parsed.message.content.len(),
            "Chat completion received"
        );
        Ok(parsed.message.content)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn prompt() -> Prompt {
        Prompt {
            system: "Answer from context.".to_string(),
            user: "How long is the warranty?".to_string(),
        }
    }

    async fn respond_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 65536];
            let _ = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    #[test]
    fn request_body_is_non_streaming_with_options() {
        let client = OllamaClient::new(
            "http://localhost:11434/",
            "llama3.2:3b",
            0.7,
            Some(42),
            Duration::from_secs(1),
        )
        .unwrap();
        let value = serde_json::to_value(client.request(&prompt())).unwrap();
        assert_eq!(value["model"], "llama3.2:3b");
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["seed"], 42);
        assert!((value["options"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "How long is the warranty?");
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn seed_is_omitted_when_unset() {
        let client =
            OllamaClient::new("http://x", "m", 0.0, None, Duration::from_secs(1)).unwrap();
        let value = serde_json::to_value(client.request(&prompt())).unwrap();
        assert!(value["options"].get("seed").is_none());
    }

    #[tokio::test]
    async fn complete_returns_message_content() {
        let url = respond_once(
            "200 OK",
            r#"{"model":"m","message":{"role":"assistant","content":"12 months."},"done":true}"#,
        )
        .await;
        let client = OllamaClient::new(&url, "m", 0.7, None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.complete(&prompt()).await.unwrap(), "12 months.");
    }

    #[tokio::test]
    async fn error_status_is_rejected() {
        let url = respond_once("404 Not Found", r#"{"error":"model 'm' not found"}"#).await;
        let client = OllamaClient::new(&url, "m", 0.7, None, Duration::from_secs(5)).unwrap();
        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = OllamaClient::new(
            &format!("http://{addr}"),
            "m",
            0.7,
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }
}
