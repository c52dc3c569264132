use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use volley_http::{HttpClient, HttpRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TargetResponse {
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    /// The request cannot be built; sending it again will fail the same way.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl TargetError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

impl From<volley_http::Error> for TargetError {
    fn from(err: volley_http::Error) -> Self {
        if err.is_request_construction() {
            return Self::InvalidRequest(err.to_string());
        }
        match err {
            volley_http::Error::Timeout(d) => Self::Timeout(d),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// The system under load. Every setup, workload and teardown action is a `POST` of an
/// opaque JSON body.
pub trait Target: Send + Sync + 'static {
    fn post(
        &self,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<TargetResponse, TargetError>> + Send;
}

/// Posts JSON bodies to `http://{host}:{port}/`.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: HttpClient,
    url: String,
    headers: Vec<(String, String)>,
}

impl HttpTarget {
    /// `headers` are sent with every request; a `Host` entry selects the virtual host.
    pub fn new(host: &str, port: u16, headers: Vec<(String, String)>) -> Self {
        Self {
            client: HttpClient::default(),
            url: format!("http://{host}:{port}/"),
            headers,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build(&self, body: Bytes, timeout: Option<Duration>) -> HttpRequest {
        self.headers
            .iter()
            .fold(HttpRequest::post_json(&self.url, body), |req, (k, v)| {
                req.with_header(k, v)
            })
            .with_timeout(timeout)
    }
}

impl Target for HttpTarget {
    async fn post(
        &self,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> Result<TargetResponse, TargetError> {
        let res = self.client.request(self.build(body, timeout)).await?;
        Ok(TargetResponse {
            status: res.status,
            body: res.body,
        })
    }
}
