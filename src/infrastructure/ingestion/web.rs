//! HTTP webpage loader.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{EngineError, FetchedPage, WebpageLoader};

use super::parsers::{page_title_and_text, HtmlParserSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    /// Whole-request timeout for a page fetch.
    pub timeout_secs: u64,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Fetches pages over HTTP and strips them to text with the HTML walker.
#[derive(Debug)]
pub struct HttpWebpageLoader {
    client: reqwest::Client,
    remove_tags: Vec<String>,
}

impl HttpWebpageLoader {
    pub fn new(settings: WebSettings) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| EngineError::config(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            remove_tags: HtmlParserSettings::default().remove_tags,
        })
    }
}

#[async_trait]
impl WebpageLoader for HttpWebpageLoader {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, EngineError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::web_fetch(url, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EngineError::web_fetch(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        let raw = response
            .text()
            .await
            .map_err(|e| EngineError::web_fetch(url, format!("failed to read body: {e}")))?;
        tracing::debug!(url, bytes = raw.len(), "webpage fetched");

        let (title, text) = page_title_and_text(&raw, &self.remove_tags);
        let mut page = FetchedPage::new(url, text);
        if let Some(title) = title {
            page = page.with_title(title);
        }
        Ok(page)
    }
}
