use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Blocking client shared by one run. A request past `timeout_secs` is a failed fetch.
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.5"));
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(BROWSER_UA)
        .default_headers(headers)
        .build()
        .context("failed to build http client")
}

pub fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .send()
        .with_context(|| format!("request failed: {url}"))?;
    let status = resp.status();
    let body = resp.text().context("failed reading body")?;
    if !status.is_success() {
        let snippet = body
            .trim()
            .replace(['\n', '\r'], " ")
            .chars()
            .take(160)
            .collect::<String>();
        return Err(anyhow::anyhow!("http {status} for {url}: {snippet}"));
    }
    Ok(body)
}
