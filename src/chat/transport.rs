//! Core `ChatTransport` trait and `HttpChatTransport` implementation.
//!
//! `HttpChatTransport` posts `{"message": …}` to the configured chat endpoint
//! and expects `{"reply": …}` back.  All connection details come from
//! [`ChatConfig`]; nothing is hardcoded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ChatConfig;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    reply: String,
}

/// The assistant's answer to one message.  The text is passed through
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
}

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Errors from a single request/response exchange.
///
/// These are diagnostics for the log; the conversation collapses every
/// variant into one user-facing fallback message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint could not be reached (DNS, refused connection, reset).
    #[error("chat endpoint unreachable: {0}")]
    NetworkUnreachable(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("chat endpoint returned HTTP {0}")]
    ServerError(u16),

    /// The body could not be turned into a [`Reply`].
    #[error("malformed chat response: {0}")]
    MalformedResponse(String),

    /// No answer within the configured bound.
    #[error("chat request timed out")]
    Timeout,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_decode() {
            TransportError::MalformedResponse(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::ServerError(status.as_u16())
        } else {
            TransportError::NetworkUnreachable(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ChatTransport trait
// ---------------------------------------------------------------------------

/// One request/response exchange with the backend chat endpoint.
///
/// Implementors make exactly one attempt per call; retry policy belongs to
/// the caller.  `message` is never empty after trimming; the conversation
/// validates before calling.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, message: &str) -> Result<Reply, TransportError>;
}

// ---------------------------------------------------------------------------
// HttpChatTransport
// ---------------------------------------------------------------------------

/// JSON-over-HTTP transport for the chat endpoint.
pub struct HttpChatTransport {
    client: reqwest::Client,
    config: ChatConfig,
}

impl HttpChatTransport {
    /// Build a transport from application config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`.  A default client is used as a last-resort
    /// fallback if the builder fails.
    pub fn from_config(config: &ChatConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    /// The endpoint this transport talks to.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    /// `POST` the message; the `Authorization: Bearer …` header is attached
    /// only when `config.api_key` is a non-empty string.
    async fn send(&self, message: &str) -> Result<Reply, TransportError> {
        let mut req = self
            .client
            .post(&self.config.endpoint)
            .json(&ChatRequest { message });

        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::ServerError(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: ChatResponse = serde_json::from_slice(&body)
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;

        if parsed.reply.trim().is_empty() {
            return Err(TransportError::MalformedResponse("empty reply".into()));
        }

        Ok(Reply::new(parsed.reply))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn make_config(endpoint: String, api_key: Option<&str>) -> ChatConfig {
        ChatConfig {
            endpoint,
            api_key: api_key.map(|s| s.to_string()),
            timeout_secs: 5,
            ..ChatConfig::default()
        }
    }

    /// Serve exactly one HTTP request on a loopback port and answer with
    /// `status` and `body`.  The join handle yields the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });

        (format!("http://{addr}/api/chat"), handle)
    }

    /// Read headers plus a `Content-Length` body.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    #[tokio::test]
    async fn send_returns_reply_text_untouched() {
        let (url, server) = serve_once("200 OK", r#"{"reply":"  Hi there!  "}"#).await;
        let transport = HttpChatTransport::from_config(&make_config(url, None));

        let reply = transport.send("hello").await.unwrap();
        assert_eq!(reply.text, "  Hi there!  ");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/chat"));
        assert!(request.contains(r#"{"message":"hello"}"#));
        assert!(!request.to_ascii_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn send_attaches_bearer_token_when_configured() {
        let (url, server) = serve_once("200 OK", r#"{"reply":"ok"}"#).await;
        let transport = HttpChatTransport::from_config(&make_config(url, Some("sk-test")));

        transport.send("ping").await.unwrap();

        let request = server.await.unwrap();
        assert!(request.contains("Bearer sk-test"));
    }

    #[tokio::test]
    async fn server_error_status_is_reported() {
        let (url, _server) = serve_once(
            "500 Internal Server Error",
            r#"{"reply":"Backend Error: Check Ollama connection."}"#,
        )
        .await;
        let transport = HttpChatTransport::from_config(&make_config(url, None));

        let err = transport.send("hello").await.unwrap_err();
        assert_eq!(err, TransportError::ServerError(500));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let (url, _server) = serve_once("200 OK", "<html>oops</html>").await;
        let transport = HttpChatTransport::from_config(&make_config(url, None));

        let err = transport.send("hello").await.unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn missing_reply_field_is_malformed() {
        let (url, _server) = serve_once("200 OK", r#"{"response":"wrong key"}"#).await;
        let transport = HttpChatTransport::from_config(&make_config(url, None));

        let err = transport.send("hello").await.unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn blank_reply_is_malformed() {
        let (url, _server) = serve_once("200 OK", r#"{"reply":"   "}"#).await;
        let transport = HttpChatTransport::from_config(&make_config(url, None));

        let err = transport.send("hello").await.unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn closed_port_is_network_unreachable() {
        // Bind to learn a free port, then release it so nothing listens.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport =
            HttpChatTransport::from_config(&make_config(format!("http://{addr}/api/chat"), None));

        let err = transport.send("hello").await.unwrap_err();
        assert!(matches!(err, TransportError::NetworkUnreachable(_)), "{err:?}");
    }

    #[test]
    fn transport_is_object_safe() {
        let transport: Box<dyn ChatTransport> =
            Box::new(HttpChatTransport::from_config(&ChatConfig::default()));
        drop(transport);
    }
}
