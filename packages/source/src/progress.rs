//! Progress reporting for long-running fetches and pipeline stages.
//!
//! [`ProgressCallback`] keeps the fetchers and the orchestrator independent
//! of how progress is rendered. The ingest binary plugs in `indicatif` bars;
//! tests and the server use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a fetch or pipeline stage.
///
/// Implementations must be `Send + Sync` since one callback is shared by
/// the spawned fetch task and the category worker.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected number of records, when known.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` records.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Discards all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
