// ─── HTTP ───
// The engine never talks to the network directly: everything goes through an
// injected `Fetcher`, so tests can run against fixtures.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;

use crate::core::error::NetworkError;

const APP_USER_AGENT: &str = concat!("InterfaceOficial/", env!("CARGO_PKG_VERSION"));

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetworkError>> + Send>>;

/// A successful response whose body has not been read yet.
pub struct FetchResponse {
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl FetchResponse {
    /// Read the whole body into memory.
    pub async fn collect(mut self) -> Result<Bytes, NetworkError> {
        let mut buf = Vec::with_capacity(self.content_length.unwrap_or(0) as usize);
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }
}

/// HTTP GET capability supplied by the caller.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Start a GET request. Non-success statuses are errors.
    async fn get(&self, url: &str) -> Result<FetchResponse, NetworkError>;
}

/// Longest wait for the next body chunk before a transfer counts as stalled.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_http_client(read_timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(Duration::from_secs(15))
        .read_timeout(read_timeout)
        .build()
}

/// Production fetcher backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(read_timeout: Duration) -> Result<Self, NetworkError> {
        let client = build_http_client(read_timeout).map_err(|e| NetworkError::Request {
            url: String::new(),
            message: format!("failed to build HTTP client: {e}"),
        })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, NetworkError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| NetworkError::from_reqwest(&owned_url, e)));

        Ok(FetchResponse {
            content_length,
            body: Box::pin(body),
        })
    }
}
