use core::fmt;

use serde::{Deserialize, Serialize};

/// Process-local identifier the transport assigns to each stream.
pub type StreamId = i64;

/// The two discovery protocol variants a stream can speak.
///
/// Both kinds are tracked in disjoint state, so the same [`StreamId`] may be
/// registered once per kind without the entries interfering.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamKind {
    /// Every response carries the full resource set.
    StateOfTheWorld,
    /// Requests and responses carry subscribe/unsubscribe deltas.
    Incremental,
}

impl StreamKind {
    #[must_use]
    pub const fn is_delta(self) -> bool {
        matches!(self, Self::Incremental)
    }

    /// Value of the `is_delta_stream` metric label.
    #[must_use]
    pub const fn delta_label(self) -> &'static str {
        if self.is_delta() {
            "true"
        } else {
            "false"
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateOfTheWorld => f.write_str("state-of-the-world"),
            Self::Incremental => f.write_str("incremental"),
        }
    }
}
