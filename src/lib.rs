// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod sync;
pub mod warehouse;
pub mod window;

pub use crate::api::{router, AppState};
pub use crate::entity::Entity;
pub use crate::error::{FetchError, SyncError};
pub use crate::sync::{JobOptions, SyncJob, SyncService, SyncSummary};
pub use crate::window::SyncRequest;
