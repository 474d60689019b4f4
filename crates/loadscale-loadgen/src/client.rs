//! HTTP dispatch for load tests.
//!
//! The generator measures latency itself; a client only reports the
//! status code or why no status arrived.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Boxed, sendable future returned by [`HttpClient::get`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Why a request produced no HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
}

/// Sends one GET request to a target URL.
pub trait HttpClient: Send + Sync {
    fn get<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<u16, DispatchError>>;
}

/// Plain HTTP/1.1 client over a fresh TCP connection per request.
#[derive(Debug, Clone)]
pub struct HyperClient {
    timeout: Duration,
}

impl HyperClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn send(target: &str) -> Result<u16, DispatchError> {
        let uri: http::Uri = target
            .parse()
            .map_err(|e| DispatchError::Connection(format!("bad target: {e}")))?;
        let authority = uri
            .authority()
            .ok_or_else(|| DispatchError::Connection("target has no host".into()))?
            .clone();
        let address = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));

        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .map_err(|e| DispatchError::Connection(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| DispatchError::Connection(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(uri)
            .header("host", authority.as_str())
            .header("user-agent", concat!("loadscale/", env!("CARGO_PKG_VERSION")))
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| DispatchError::Connection(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| DispatchError::Connection(e.to_string()))?;
        Ok(resp.status().as_u16())
    }
}

impl HttpClient for HyperClient {
    fn get<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<u16, DispatchError>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, Self::send(target)).await {
                Ok(Ok(status)) => Ok(status),
                Ok(Err(e)) => {
                    debug!(error = %e, url = target, "load request failed");
                    Err(e)
                }
                Err(_) => {
                    debug!(url = target, "load request timed out");
                    Err(DispatchError::Timeout)
                }
            }
        })
    }
}
