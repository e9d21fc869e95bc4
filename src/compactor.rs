use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::EngineError;
use crate::observability;
use crate::store::Storage;

/// Compact the WAL if at least `threshold` events were appended since the last
/// compaction. Returns whether it compacted.
pub async fn maybe_compact(storage: &Storage, threshold: u64) -> Result<bool, EngineError> {
    let appended = storage.appends_since_compact().await?;
    if appended < threshold {
        return Ok(false);
    }
    debug!(appended, threshold, "compacting WAL");
    storage.compact().await?;
    metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
    Ok(true)
}

/// Background task that keeps the WAL short. Exits once storage is closed.
pub async fn run_compactor(storage: Arc<Storage>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match maybe_compact(&storage, threshold).await {
            Ok(_) => {}
            Err(_) if storage.is_closed().await => {
                debug!("storage closed, compactor exiting");
                return;
            }
            Err(e) => warn!("compaction failed: {e}"),
        }
    }
}
