//! Async event loop for hosts that bridge source events over a channel.
//!
//! Some hosts receive location callbacks on a runtime of their own and
//! forward them as [`SourceEvent`]s. [`spawn_event_loop`] feeds such a
//! channel into [`LocationTracker::handle_event`] one event at a time, which
//! keeps the "never overlapping" delivery guarantee of a position source.
//!
//! # Example
//!
//! ```ignore
//! let (tx, rx) = mpsc::channel(16);
//! let cancellation = CancellationToken::new();
//! let handle = spawn_event_loop(tracker.clone(), rx, cancellation.clone());
//!
//! tx.send(SourceEvent::PositionChanged(fix)).await?;
//! cancellation.cancel();
//! let stats = handle.await?;
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{EventOutcome, LocationTracker};
use crate::source::SourceEvent;

/// Counters reported when the event loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventLoopStats {
    /// Events taken from the channel.
    pub events: u64,
    /// Position events delivered to listeners.
    pub positions: u64,
    /// Availability events that triggered provider selection.
    pub reselections: u64,
    /// Selections that left tracking inactive.
    pub inactive: u64,
    /// Events whose handling task did not complete.
    pub failed: u64,
}

impl EventLoopStats {
    fn record(&mut self, outcome: &EventOutcome) {
        self.events += 1;
        match outcome {
            EventOutcome::Delivered(_) => self.positions += 1,
            EventOutcome::Reselected(_) => self.reselections += 1,
            EventOutcome::TrackingInactive(_) => {
                self.reselections += 1;
                self.inactive += 1;
            }
            EventOutcome::Ignored => {}
        }
    }
}

/// Spawn a task that hands every event from `events` to `tracker`.
///
/// Events are handled one at a time on the blocking pool, in channel order.
/// Stops when the cancellation token fires or every sender is dropped.
pub fn spawn_event_loop(
    tracker: Arc<LocationTracker>,
    mut events: mpsc::Receiver<SourceEvent>,
    cancellation: CancellationToken,
) -> JoinHandle<EventLoopStats> {
    tokio::spawn(async move {
        let mut stats = EventLoopStats::default();

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::debug!("Location event loop cancelled");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("Location event channel closed");
                        break;
                    };
                    // Checkpoint I/O and listener callbacks block.
                    let handler = Arc::clone(&tracker);
                    match tokio::task::spawn_blocking(move || handler.handle_event(event)).await {
                        Ok(outcome) => stats.record(&outcome),
                        Err(e) => {
                            stats.events += 1;
                            stats.failed += 1;
                            tracing::error!(error = %e, "Location event handler failed");
                        }
                    }
                }
            }
        }

        tracing::info!(
            events = stats.events,
            positions = stats.positions,
            reselections = stats.reselections,
            failed = stats.failed,
            "Location event loop stopped"
        );
        stats
    })
}
