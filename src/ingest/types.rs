// src/ingest/types.rs
use async_trait::async_trait;

use crate::entity::{EntitySpec, Record};
use crate::error::FetchError;
use crate::window::TimeWindow;

/// Records per page; also the only parameter kept on follow-up requests.
pub const PAGE_SIZE: u32 = 250;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// Collection endpoint with the window filters and field selection.
    First {
        resource: String,
        window: TimeWindow,
        fields: Vec<String>,
    },
    /// Follow a next-page cursor returned by the previous page.
    Next { resource: String, cursor: String },
}

impl PageRequest {
    pub fn first(entity: &EntitySpec, window: &TimeWindow) -> Self {
        PageRequest::First {
            resource: entity.resource.to_string(),
            window: *window,
            fields: entity
                .field_selection
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }

    pub fn resource(&self) -> &str {
        match self {
            PageRequest::First { resource, .. } | PageRequest::Next { resource, .. } => resource,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// Cursor for the next page, if the source has more.
    pub next: Option<String>,
}

/// One page of a cursor-paginated collection.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError>;
    fn name(&self) -> &'static str;
}
