use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected reply: {0}")]
    Protocol(String),
}

/// Status and decoded body of an HTTP exchange. Bodies that are not JSON
/// arrive as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: JsonValue,
}

/// Raw network reachability checks. Interpreting the outcome is left to the
/// caller so the rules can be tested without a network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    async fn http_get(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError>;

    async fn http_post_json(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: JsonValue,
        timeout: Duration,
    ) -> Result<HttpReply, ProbeError>;

    async fn tcp_connect(&self, host: &str, port: u16, timeout: Duration)
        -> Result<(), ProbeError>;

    /// Sends `AUTH` (when a password is given) and `PING`; returns the reply line.
    async fn redis_ping(
        &self,
        host: &str,
        port: u16,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<String, ProbeError>;
}

/// Runs `fut` under `timeout`, turning expiry into [`ProbeError::Timeout`].
pub async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout.as_secs())),
    }
}

pub struct NetworkProber {
    client: reqwest::Client,
}

impl NetworkProber {
    pub fn new() -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tradedesk/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn map_reqwest(error: reqwest::Error, timeout: Duration) -> ProbeError {
        if error.is_timeout() {
            ProbeError::Timeout(timeout.as_secs())
        } else {
            ProbeError::Connect(error.to_string())
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn http_get(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        tracing::debug!(url = %url, "Probing HTTP endpoint");
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_reqwest(e, timeout))?;

        Ok(response.status().as_u16())
    }

    async fn http_post_json(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: JsonValue,
        timeout: Duration,
    ) -> Result<HttpReply, ProbeError> {
        let mut request = self.client.post(url).timeout(timeout).json(&body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_reqwest(e, timeout))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Self::map_reqwest(e, timeout))?;
        let body = serde_json::from_str(&text).unwrap_or(JsonValue::String(text));

        Ok(HttpReply { status, body })
    }

    async fn tcp_connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<(), ProbeError> {
        tracing::debug!(host = %host, port, "Probing TCP endpoint");
        bounded(timeout, async {
            TcpStream::connect((host, port))
                .await
                .map(|_| ())
                .map_err(|e| ProbeError::Connect(e.to_string()))
        })
        .await
    }

    async fn redis_ping(
        &self,
        host: &str,
        port: u16,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<String, ProbeError> {
        bounded(timeout, async {
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(|e| ProbeError::Connect(e.to_string()))?;
            let mut stream = BufReader::new(stream);

            if let Some(password) = password {
                let reply = resp_exchange(&mut stream, &["AUTH", &password]).await?;
                if !reply.starts_with('+') {
                    return Err(ProbeError::Protocol(reply));
                }
            }

            resp_exchange(&mut stream, &["PING"]).await
        })
        .await
    }
}

fn resp_command(parts: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", parts.len());
    for part in parts {
        out.push_str(&format!("${}\r\n{}\r\n", part.len(), part));
    }
    out.into_bytes()
}

async fn resp_exchange(
    stream: &mut BufReader<TcpStream>,
    parts: &[&str],
) -> Result<String, ProbeError> {
    stream
        .get_mut()
        .write_all(&resp_command(parts))
        .await
        .map_err(|e| ProbeError::Connect(e.to_string()))?;

    let mut line = String::new();
    let read = stream
        .read_line(&mut line)
        .await
        .map_err(|e| ProbeError::Connect(e.to_string()))?;
    if read == 0 {
        return Err(ProbeError::Protocol("connection closed".to_string()));
    }

    Ok(line.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_resp_arrays() {
        assert_eq!(resp_command(&["PING"]), b"*1\r\n$4\r\nPING\r\n".to_vec());
        assert_eq!(
            resp_command(&["AUTH", "pw"]),
            b"*2\r\n$4\r\nAUTH\r\n$2\r\npw\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn bounded_reports_timeouts() {
        let result: Result<(), ProbeError> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(ProbeError::Timeout(0)));
    }

    #[tokio::test]
    async fn redis_ping_speaks_resp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            let mut line = String::new();
            // *1, $4, PING
            for _ in 0..3 {
                line.clear();
                socket.read_line(&mut line).await.unwrap();
            }
            socket.get_mut().write_all(b"+PONG\r\n").await.unwrap();
        });

        let prober = NetworkProber::new().unwrap();
        let reply = prober
            .redis_ping("127.0.0.1", port, None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, "+PONG");
    }

    #[tokio::test]
    async fn tcp_connect_fails_on_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = NetworkProber::new().unwrap();
        let result = prober
            .tcp_connect("127.0.0.1", port, Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(ProbeError::Connect(_))));
    }
}
