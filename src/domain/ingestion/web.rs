//! Webpage loading seam

use async_trait::async_trait;
use std::fmt::Debug;

use crate::domain::EngineError;

/// A fetched webpage reduced to plain text.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            text: text.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Fetches a URL and strips it to text. Implemented over HTTP in
/// infrastructure; mocked in tests so the pipeline never needs a network.
#[async_trait]
pub trait WebpageLoader: Send + Sync + Debug {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, EngineError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock loader serving canned pages keyed by URL.
    #[derive(Debug, Default)]
    pub struct MockWebpageLoader {
        pages: Mutex<HashMap<String, String>>,
        fail_all: bool,
    }

    impl MockWebpageLoader {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(self, url: impl Into<String>, text: impl Into<String>) -> Self {
            self.pages.lock().unwrap().insert(url.into(), text.into());
            self
        }

        pub fn failing() -> Self {
            Self {
                pages: Mutex::new(HashMap::new()),
                fail_all: true,
            }
        }
    }

    #[async_trait]
    impl WebpageLoader for MockWebpageLoader {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, EngineError> {
            if self.fail_all {
                return Err(EngineError::web_fetch(url, "mock failure"));
            }
            match self.pages.lock().unwrap().get(url) {
                Some(text) => Ok(FetchedPage::new(url, text.clone())),
                None => Err(EngineError::web_fetch(url, "no canned page")),
            }
        }
    }
}
