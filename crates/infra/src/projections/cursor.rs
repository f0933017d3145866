use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use poleyard_core::AggregateId;

use super::ProjectionError;

/// Outcome of offering an envelope to a cursor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Advance {
    /// First sighting; apply the event.
    Fresh,
    /// Already applied (at-least-once replay); skip.
    Replayed,
}

/// Per-stream exactly-once tracking for at-least-once delivery.
///
/// Tracks a contiguous watermark per stream plus the set of sequence numbers
/// seen above it. Publication order is not guaranteed when different streams
/// commit concurrently, so a fresh event may arrive with a gap; it is still
/// applied exactly once.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<AggregateId, CursorState>>,
}

#[derive(Debug, Default)]
struct CursorState {
    /// All sequence numbers `<= watermark` have been applied.
    watermark: u64,
    /// Applied sequence numbers above the watermark.
    above: HashSet<u64>,
}

impl CursorState {
    fn note(&mut self, seq: u64) -> Advance {
        if seq <= self.watermark || self.above.contains(&seq) {
            return Advance::Replayed;
        }

        self.above.insert(seq);
        // Compact: pull the watermark forward over contiguous entries.
        while self.above.remove(&(self.watermark + 1)) {
            self.watermark += 1;
        }
        Advance::Fresh
    }
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `(stream, sequence number)`; the caller applies the event only
    /// on [`Advance::Fresh`].
    pub fn advance(
        &self,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<Advance, ProjectionError> {
        if sequence_number == 0 {
            return Err(ProjectionError::InvalidSequence { found: 0 });
        }

        let mut cursors = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Ok(cursors.entry(aggregate_id).or_default().note(sequence_number))
    }

    /// Forget all cursors (projection rebuild support).
    pub fn reset(&self) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.clear();
        }
    }
}
