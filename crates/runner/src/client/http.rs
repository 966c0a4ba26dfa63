//! Remote agent over HTTP.

use super::{ClientError, DecisionClient};
use async_trait::async_trait;
use qbench_core::{ObservationFormatter, ResponseParser};
use qbench_types::{Action, Observation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Maximum number of error body characters kept in a [`ClientError::Status`].
const STATUS_BODY_LEN: usize = 200;

/// Body of `POST <url>/act`.
#[derive(Debug, Serialize)]
pub struct ActRequest<'a> {
    pub observation: &'a Observation,
    /// Text rendering of the observation, for language-model agents.
    pub prompt: String,
}

/// Optional JSON envelope around the agent's reply text.
#[derive(Debug, Deserialize)]
pub struct ActResponse {
    pub response: String,
}

/// Posts each observation to `<base_url>/act` and parses the reply.
///
/// The reply is either the action text itself or `{"response": "<text>"}`;
/// the text goes through [`ResponseParser`] either way.
#[derive(Debug, Clone)]
pub struct HttpClient {
    name: String,
    url: String,
    client: Client,
    formatter: ObservationFormatter,
    parser: ResponseParser,
}

impl HttpClient {
    /// Create a client for the agent served at `base_url`.
    ///
    /// `request_timeout` bounds each request at the transport level.
    pub fn new(base_url: &str, request_timeout: Option<Duration>) -> Result<Self, ClientError> {
        let base = base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(ClientError::Setup("empty agent URL".to_string()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            name: format!("http:{}", base),
            url: format!("{}/act", base),
            client: builder.build()?,
            formatter: ObservationFormatter::new(),
            parser: ResponseParser::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DecisionClient for HttpClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exchange(&mut self, observation: &Observation) -> Result<Vec<Action>, ClientError> {
        let request = ActRequest {
            observation,
            prompt: self.formatter.format_prompt(observation),
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: body.chars().take(STATUS_BODY_LEN).collect(),
            });
        }

        debug!(
            step = observation.time.0,
            status = status.as_u16(),
            bytes = body.len(),
            "Agent replied"
        );

        let text = reply_text(&body);
        Ok(self.parser.parse(&text)?)
    }
}

/// Unwrap the `{"response": ...}` envelope if present.
fn reply_text(body: &str) -> String {
    match serde_json::from_str::<ActResponse>(body) {
        Ok(envelope) => envelope.response,
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbench_types::Step;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn observation() -> Observation {
        Observation {
            time: Step(0),
            horizon: 10,
            capacity_per_step: 2,
            ..Default::default()
        }
    }

    /// Serve one canned HTTP response and hand back the request body.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }

            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();

            let text = String::from_utf8_lossy(&request).to_string();
            text.split("\r\n\r\n").nth(1).unwrap_or_default().to_string()
        });

        (url, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }

    #[test]
    fn test_reply_text_envelope() {
        assert_eq!(reply_text(r#"{"response": "noop"}"#), "noop");
        assert_eq!(reply_text("schedule t1 at step 2"), "schedule t1 at step 2");
        assert_eq!(
            reply_text(r#"[{"type": "noop"}]"#),
            r#"[{"type": "noop"}]"#
        );
    }

    #[test]
    fn test_rejects_empty_url() {
        assert!(matches!(
            HttpClient::new("", None),
            Err(ClientError::Setup(_))
        ));
        let client = HttpClient::new("http://localhost:9000/", None).unwrap();
        assert_eq!(client.url(), "http://localhost:9000/act");
    }

    #[tokio::test]
    async fn test_exchange_parses_reply() {
        let (url, server) = serve_once("200 OK", r#"{"response": "schedule t1 at step 3"}"#).await;
        let mut client = HttpClient::new(&url, Some(Duration::from_secs(5))).unwrap();

        let actions = client.exchange(&observation()).await.unwrap();
        assert_eq!(actions, vec![Action::schedule("t1", 3)]);

        let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(request["observation"]["horizon"], 10);
        assert!(request["prompt"].as_str().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_exchange_reports_http_status() {
        let (url, server) = serve_once("503 Service Unavailable", "overloaded").await;
        let mut client = HttpClient::new(&url, Some(Duration::from_secs(5))).unwrap();

        match client.exchange(&observation()).await {
            Err(ClientError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected status error, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_exchange_reports_garbage() {
        let (url, server) = serve_once("200 OK", "I would rather not").await;
        let mut client = HttpClient::new(&url, Some(Duration::from_secs(5))).unwrap();

        assert!(matches!(
            client.exchange(&observation()).await,
            Err(ClientError::Parse(_))
        ));
        server.await.unwrap();
    }
}
