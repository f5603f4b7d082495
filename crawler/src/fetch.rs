use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::header;
use sift_core::html::{self, PageInfo};
use std::time::Duration;

pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Retrieves a page body. Any `Err` drops the job for this run.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send()?;
        if !resp.status().is_success() {
            return Err(anyhow!("status {}", resp.status()));
        }
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("");
        if !content_type.contains("text/html") {
            return Err(anyhow!("not html: {content_type:?}"));
        }
        if resp.content_length().is_some_and(|n| n as usize > MAX_BODY_BYTES) {
            return Err(anyhow!("body too large"));
        }
        let bytes = resp.bytes()?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(anyhow!("body too large: {} bytes", bytes.len()));
        }
        Ok(bytes.to_vec())
    }
}

/// Pulls links and page metadata out of a fetched body.
pub trait Extractor: Send + Sync {
    fn extract(&self, url: &str, body: &[u8]) -> PageInfo;
}

pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn extract(&self, url: &str, body: &[u8]) -> PageInfo {
        html::extract_page(url, body)
    }
}
