//! Blocking HTTP client for server transports.

use dirsync_node::HttpClient;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;

const CBOR: &str = "application/cbor";

/// [`HttpClient`] backed by `reqwest`'s blocking client.
///
/// Clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Builds a client with the given per-request timeout.
    ///
    /// Must be called outside of an async context.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dirsync-node/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, CBOR)
            .header(ACCEPT, CBOR)
            .body(body)
            .send()
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{} returned {}", url, status));
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|e| e.to_string())
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
