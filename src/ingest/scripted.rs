// src/ingest/scripted.rs
//
// --- Test helper ---
// In-memory `PageSource` that serves a fixed list of pages linked by
// `page:N` cursors and records every request it receives.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::types::{Page, PageRequest, PageSource};

pub struct ScriptedSource {
    pages: Vec<Vec<Value>>,
    fail_on_page: Option<usize>,
    delay: Option<Duration>,
    requests: Mutex<Vec<PageRequest>>,
}

impl ScriptedSource {
    pub fn new(pages: Vec<Vec<Value>>) -> Self {
        Self {
            pages,
            fail_on_page: None,
            delay: None,
            requests: Mutex::new(vec![]),
        }
    }

    /// A source with a single empty page.
    pub fn empty() -> Self {
        Self::new(vec![vec![]])
    }

    /// Answer page `index` (0-based) with a 503.
    pub fn failing_on(mut self, index: usize) -> Self {
        self.fail_on_page = Some(index);
        self
    }

    /// Sleep before answering each page.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let index = match request {
            PageRequest::First { .. } => 0,
            PageRequest::Next { cursor, .. } => cursor
                .strip_prefix("page:")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| FetchError::MalformedBody(format!("unknown cursor {cursor}")))?,
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_page == Some(index) {
            return Err(FetchError::Status {
                status: 503,
                url: format!("scripted://page/{index}"),
            });
        }

        let records = self
            .pages
            .get(index)
            .map(|items| {
                items
                    .iter()
                    .map(|v| {
                        v.as_object()
                            .cloned()
                            .ok_or_else(|| FetchError::MalformedBody(format!("not an object: {v}")))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        let next = (index + 1 < self.pages.len()).then(|| format!("page:{}", index + 1));

        Ok(Page { records, next })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
