//! Protocol-independent entities shared by the snapshot cache and its
//! collaborators: nodes, streams, snapshots and pre-decoded discovery
//! messages.

pub mod discovery;
pub mod node;
pub mod snapshot;
pub mod stream;
