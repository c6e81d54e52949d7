use std::sync::Arc;

use crate::queue::JobQueue;
use crate::records::AnalysisStore;
use crate::storage::BlobStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn AnalysisStore>,
    /// Uploaded resumes. Local disk or S3, chosen by `STORAGE_BACKEND`.
    pub blobs: Arc<dyn BlobStore>,
    pub queue: Arc<dyn JobQueue>,
}
