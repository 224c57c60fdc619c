//! sheetq-llm: Language model client for sheetq
//!
//! Talks to an Ollama-compatible chat endpoint. The same client serves both
//! capabilities the executor needs: [`PlanGenerator`] asks for JSON output and
//! parses it into a plan, [`TextCompleter`] returns the plain completion used
//! by per-row text analysis.
//!
//! Callers are synchronous, so the client owns a small tokio runtime and
//! blocks on each request. Every request is bounded by the configured
//! timeout.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::time::Duration;

use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};

use sheetq_core::constants::DEFAULT_LLM_TIMEOUT_SECS;
use sheetq_core::services::parse_plan_text;
use sheetq_core::{Plan, PlanGenerator, TextCompleter};

/// Default Ollama server address
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model name
pub const DEFAULT_MODEL: &str = "llama3.1";

/// Error types for model requests
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transport failures and non-success statuses
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not finish within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with something other than a chat response
    #[error("Malformed response: {0}")]
    Response(String),

    /// The runtime could not be started
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl From<LlmError> for sheetq_core::Error {
    fn from(err: LlmError) -> Self {
        sheetq_core::Error::external(err.to_string())
    }
}

/// Connection settings for [`OllamaClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    /// Server address, without the `/api/chat` path
    pub base_url: String,
    /// Model to query
    pub model: String,
    /// Upper bound on a single request
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Blocking client for an Ollama chat endpoint
#[derive(Debug)]
pub struct OllamaClient {
    config: OllamaConfig,
    http: Client,
    runtime: Runtime,
}

impl OllamaClient {
    /// Create a client with its own runtime
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        Ok(Self {
            config,
            http,
            runtime,
        })
    }

    /// The settings this client was built with
    #[must_use]
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.config.base_url.trim_end_matches('/'))
    }

    /// Send one prompt and return the completion text
    ///
    /// With `json_mode` the server is asked to constrain its output to JSON.
    pub async fn chat(&self, prompt: &str, json_mode: bool) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            format: json_mode.then_some("json"),
        };

        let url = self.endpoint();
        debug!("POST {url} (model {}, {} prompt bytes)", self.config.model, prompt.len());
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        parse_chat_response(&body)
    }

    /// Blocking wrapper around [`OllamaClient::chat`]
    pub fn chat_blocking(&self, prompt: &str, json_mode: bool) -> Result<String, LlmError> {
        let limit = self.config.timeout;
        self.runtime
            .block_on(async { tokio::time::timeout(limit, self.chat(prompt, json_mode)).await })
            .map_err(|_| LlmError::Timeout(limit))?
    }
}

fn parse_chat_response(body: &str) -> Result<String, LlmError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::Response(format!("{e} in {}", truncate(body))))?;
    if let Some(error) = parsed.error {
        return Err(LlmError::Response(error));
    }
    parsed
        .message
        .map(|m| m.content)
        .ok_or_else(|| LlmError::Response(format!("no message in {}", truncate(body))))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((cut, _)) => &body[..cut],
        None => body,
    }
}

impl TextCompleter for OllamaClient {
    fn complete(&self, prompt: &str) -> sheetq_core::Result<String> {
        let content = self.chat_blocking(prompt, false).map_err(|e| {
            warn!("Text completion failed: {e}");
            e
        })?;
        Ok(content.trim().to_string())
    }
}

impl PlanGenerator for OllamaClient {
    fn generate_plan(&self, prompt: &str) -> sheetq_core::Result<Plan> {
        let content = self.chat_blocking(prompt, true)?;
        debug!("Model returned {} bytes of plan text", content.len());
        parse_plan_text(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serve exactly one request with a canned body and hand the request
    /// body back through the channel.
    fn one_shot_server(status: &'static str, body: String) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request = vec![0; content_length];
            reader.read_exact(&mut request).unwrap();
            tx.send(String::from_utf8(request).unwrap()).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
        });
        (format!("http://{addr}/"), rx)
    }

    fn client(base_url: String, timeout: Duration) -> OllamaClient {
        OllamaClient::new(OllamaConfig {
            base_url,
            model: "test-model".to_string(),
            timeout,
        })
        .unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            model: "m",
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            stream: false,
            format: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": false
            })
        );
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"model":"m","message":{"role":"assistant","content":"Positive"},"done":true}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "Positive");

        let err = parse_chat_response(r#"{"error":"model not found"}"#).unwrap_err();
        assert!(err.to_string().contains("model not found"));

        assert!(matches!(
            parse_chat_response("not json"),
            Err(LlmError::Response(_))
        ));
        assert!(matches!(
            parse_chat_response(r#"{"done":true}"#),
            Err(LlmError::Response(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = client("http://example.test:11434/".to_string(), Duration::from_secs(1));
        assert_eq!(client.endpoint(), "http://example.test:11434/api/chat");
    }

    #[test]
    fn test_generate_plan_over_http() {
        let reply = serde_json::json!({
            "message": {
                "role": "assistant",
                "content": "```json\n{\"target_sheet\": \"Employees\", \"operations\": []}\n```"
            },
            "done": true
        });
        let (url, requests) = one_shot_server("200 OK", reply.to_string());
        let client = client(url, Duration::from_secs(5));

        let plan = client.generate_plan("make a plan").unwrap();
        assert_eq!(plan.target_sheet, "Employees");
        assert!(plan.operations.is_empty());

        let sent: serde_json::Value = serde_json::from_str(&requests.recv().unwrap()).unwrap();
        assert_eq!(sent["model"], "test-model");
        assert_eq!(sent["format"], "json");
        assert_eq!(sent["stream"], false);
        assert_eq!(sent["messages"][0]["content"], "make a plan");
    }

    #[test]
    fn test_completion_is_trimmed_and_not_json_mode() {
        let reply = serde_json::json!({"message": {"role": "assistant", "content": "  Neutral \n"}});
        let (url, requests) = one_shot_server("200 OK", reply.to_string());
        let client = client(url, Duration::from_secs(5));

        assert_eq!(client.complete("classify").unwrap(), "Neutral");
        let sent: serde_json::Value = serde_json::from_str(&requests.recv().unwrap()).unwrap();
        assert!(sent.get("format").is_none());
    }

    #[test]
    fn test_server_error_becomes_external_error() {
        let (url, _requests) =
            one_shot_server("500 Internal Server Error", r#"{"error":"boom"}"#.to_string());
        let client = client(url, Duration::from_secs(5));

        let err = client.complete("anything").unwrap_err();
        assert!(matches!(err, sheetq_core::Error::ExternalService(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_unresponsive_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let client = client(url, Duration::from_millis(200));

        let err = client.chat_blocking("hello", false).unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_) | LlmError::Http(_)));
        drop(listener);
    }
}
