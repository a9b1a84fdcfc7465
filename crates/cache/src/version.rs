use xds_snapshot_primitives::snapshot::Version;

/// Issues the version token for each new snapshot generation.
///
/// Holds no lock of its own; callers serialize access.
#[derive(Debug, Default)]
pub(crate) struct SnapshotVersioner {
    current: i64,
}

impl SnapshotVersioner {
    #[cfg(test)]
    pub(crate) const fn starting_at(current: i64) -> Self {
        Self { current }
    }

    /// Returns the next version, restarting at "1" once the counter has
    /// reached `i64::MAX`.
    pub(crate) fn next(&mut self) -> Version {
        self.current = self.current.checked_add(1).unwrap_or(1);
        self.current.to_string().into()
    }
}
