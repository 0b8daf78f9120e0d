//! Progress events emitted by the ingestion pipeline (§4.6).

/// One stage transition of a single document's ingestion. Callers
/// typically forward these to a UI progress bar or a log.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started { document_id: String, total_bytes: u64 },
    Loaded { document_id: String, record_count: usize },
    Chunked { document_id: String, chunk_count: usize },
    Embedded { document_id: String, chunk_count: usize },
    Stored { document_id: String },
    Completed { document_id: String },
    Cancelled { document_id: String },
    Failed { document_id: String, message: String },
}

/// Where an [`IngestionPipeline`](crate::ingestion::IngestionPipeline) sends
/// its [`ProgressEvent`]s. A plain closure works for simple callers; an
/// `UnboundedSender` lets a caller drain events from a separate task (e.g.
/// to drive a UI progress bar without blocking ingestion on render).
pub trait ProgressSink: Send + Sync {
    fn send(&self, event: ProgressEvent);
}

impl ProgressSink for tokio::sync::mpsc::UnboundedSender<ProgressEvent> {
    fn send(&self, event: ProgressEvent) {
        // The receiver may have been dropped if the caller stopped
        // listening; that is not ingestion's problem.
        let _ = tokio::sync::mpsc::UnboundedSender::send(self, event);
    }
}

impl<F: Fn(ProgressEvent) + Send + Sync> ProgressSink for F {
    fn send(&self, event: ProgressEvent) {
        self(event)
    }
}
