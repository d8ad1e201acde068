//! Single logical worker draining burst events into a sink.
//!
//! The transport pushes [`ChirpEvent`]s into a bounded tokio channel; one worker task
//! processes them one at a time, end to end, and hands each record to the sink.
//! Per-event failures are logged and the event dropped; the worker stops on sink
//! failure or when every sender is gone.

use crate::error::AppResult;
use crate::processor::{BurstProcessor, StatsSnapshot};
use crate::transport::{ChirpEvent, RecordSink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default capacity of the event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Create the event channel feeding [`run`].
pub fn event_channel() -> (mpsc::Sender<ChirpEvent>, mpsc::Receiver<ChirpEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_CAPACITY)
}

/// Process events until the channel closes and return the final counters.
pub async fn run<S: RecordSink>(
    processor: Arc<BurstProcessor>,
    mut events: mpsc::Receiver<ChirpEvent>,
    mut sink: S,
) -> AppResult<StatsSnapshot> {
    while let Some(event) = events.recv().await {
        match processor
            .process(&event)
            .and_then(|record| sink.emit(record))
        {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => {
                debug!(device = %event.device_id, seq = event.seqno, error = %err, "Event dropped");
            }
            Err(err) => {
                warn!(error = %err, "Worker stopping on fatal error");
                return Err(err);
            }
        }
    }

    let stats = processor.stats().snapshot();
    info!(
        bursts = stats.bursts,
        tofs = stats.tofs,
        degenerate = stats.degenerate,
        malformed = stats.malformed,
        stale_reciprocal = stats.stale_reciprocal,
        devices = processor.registry().len(),
        "Event stream closed"
    );
    Ok(stats)
}
