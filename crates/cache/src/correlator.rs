//! Request/response timing for incremental streams.
//!
//! Each delta request gets a [`RequestSequence`] on arrival. Sequences keep
//! increasing across streams, so a stream ID that is closed and reopened never
//! hands out a sequence its previous incarnation used. The sequence travels on
//! the request to the response hook, which uses it to find the arrival time.
//! Entries live in a per-stream slot of a sharded map, so correlation never
//! contends with snapshot generation or with unrelated streams, and closing a
//! stream drops whatever it left behind.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::collections::HashMap;
use std::time::Instant;

use dashmap::DashMap;
use xds_snapshot_primitives::discovery::RequestSequence;
use xds_snapshot_primitives::stream::StreamId;

#[derive(Debug, Default)]
pub(crate) struct RequestCorrelator {
    last_sequence: AtomicU64,
    streams: DashMap<StreamId, PendingRequests>,
}

#[derive(Debug, Default)]
struct PendingRequests {
    begun_at: HashMap<RequestSequence, Instant>,
}

impl RequestCorrelator {
    /// Records a request arriving on `stream_id` at `at`.
    pub(crate) fn begin(&self, stream_id: StreamId, at: Instant) -> RequestSequence {
        let last = self.last_sequence.fetch_add(1, Ordering::Relaxed);
        let sequence = RequestSequence::new(last.wrapping_add(1));

        let mut pending = self.streams.entry(stream_id).or_default();
        drop(pending.begun_at.insert(sequence, at));

        sequence
    }

    /// Consumes the matching request and returns how long ago it arrived, or
    /// `None` when nothing is pending under that sequence.
    pub(crate) fn end(
        &self,
        stream_id: StreamId,
        sequence: RequestSequence,
        now: Instant,
    ) -> Option<Duration> {
        let begun_at = self
            .streams
            .get_mut(&stream_id)?
            .begun_at
            .remove(&sequence)?;

        Some(now.saturating_duration_since(begun_at))
    }

    /// Drops every request still pending on `stream_id`, returning how many
    /// never saw a response.
    pub(crate) fn forget_stream(&self, stream_id: StreamId) -> usize {
        self.streams
            .remove(&stream_id)
            .map_or(0, |(_, pending)| pending.begun_at.len())
    }

    #[cfg(test)]
    pub(crate) fn pending(&self, stream_id: StreamId) -> usize {
        self.streams
            .get(&stream_id)
            .map_or(0, |pending| pending.begun_at.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_reports_elapsed_time() {
        let correlator = RequestCorrelator::default();
        let t0 = Instant::now();

        let sequence = correlator.begin(1, t0);
        assert_eq!(correlator.pending(1), 1);

        let elapsed = correlator.end(1, sequence, t0 + Duration::from_millis(40));

        assert_eq!(elapsed, Some(Duration::from_millis(40)));
        assert_eq!(correlator.pending(1), 0);
        assert_eq!(
            correlator.end(1, sequence, t0 + Duration::from_millis(80)),
            None,
            "an entry is consumed only once"
        );
    }

    #[test]
    fn test_unmatched_response_leaves_others_intact() {
        let correlator = RequestCorrelator::default();
        let t0 = Instant::now();

        let first = correlator.begin(1, t0);
        let second = correlator.begin(1, t0 + Duration::from_millis(5));

        assert_eq!(correlator.end(1, RequestSequence::new(99), t0), None);
        assert_eq!(correlator.end(2, first, t0), None, "stream 2 never began");
        assert_eq!(correlator.pending(1), 2);

        assert_eq!(
            correlator.end(1, second, t0 + Duration::from_millis(15)),
            Some(Duration::from_millis(10))
        );
        assert_eq!(
            correlator.end(1, first, t0 + Duration::from_millis(15)),
            Some(Duration::from_millis(15))
        );
    }

    #[test]
    fn test_sequences_never_repeat_across_reopened_streams() {
        let correlator = RequestCorrelator::default();
        let now = Instant::now();

        let first = correlator.begin(1, now);
        let second = correlator.begin(2, now);
        assert!(first < second, "{first} should precede {second}");

        let _ = correlator.forget_stream(1);
        let reopened = correlator.begin(1, now);

        assert!(second < reopened, "{second} should precede {reopened}");
        assert_eq!(correlator.end(1, first, now), None, "old sequence is gone");
        assert_eq!(correlator.end(1, reopened, now), Some(Duration::ZERO));
    }

    #[test]
    fn test_forget_stream_drops_pending_requests() {
        let correlator = RequestCorrelator::default();
        let now = Instant::now();

        let sequence = correlator.begin(5, now);
        let _ = correlator.begin(5, now);
        let _ = correlator.begin(6, now);

        assert_eq!(correlator.forget_stream(5), 2);
        assert_eq!(correlator.forget_stream(5), 0);
        assert_eq!(correlator.end(5, sequence, now), None);
        assert_eq!(correlator.pending(6), 1, "other streams are untouched");
    }
}
