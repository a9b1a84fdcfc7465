//! Pre-decoded discovery requests and responses for both protocol variants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::snapshot::Resource;

/// Rejection detail a peer attaches to a request when it NACKs the previous
/// response.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

/// Arrival order of a delta request, increasing across every stream.
///
/// The sequence is carried on the request through to the matching response
/// hook so the two can be correlated without relying on object identity.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestSequence(u64);

impl RequestSequence {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for RequestSequence {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Fields both request variants expose to the cache.
pub trait DiscoveryMessage {
    fn node(&self) -> Option<&Node>;

    fn type_url(&self) -> &str;

    fn response_nonce(&self) -> &str;

    fn error_detail(&self) -> Option<&Status>;

    /// Peer-supplied node ID, empty when the request carries no node.
    fn node_id(&self) -> &str {
        self.node().map_or("", |node| node.id.as_str())
    }
}

/// State-of-the-world request.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub version_info: String,
    pub node: Option<Node>,
    pub resource_names: Vec<String>,
    pub type_url: String,
    pub response_nonce: String,
    pub error_detail: Option<Status>,
}

impl DiscoveryMessage for DiscoveryRequest {
    fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    fn type_url(&self) -> &str {
        &self.type_url
    }

    fn response_nonce(&self) -> &str {
        &self.response_nonce
    }

    fn error_detail(&self) -> Option<&Status> {
        self.error_detail.as_ref()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub version_info: String,
    pub resources: Vec<Resource>,
    pub type_url: String,
    pub nonce: String,
}

/// Incremental request.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeltaDiscoveryRequest {
    pub node: Option<Node>,
    pub type_url: String,
    pub resource_names_subscribe: Vec<String>,
    pub resource_names_unsubscribe: Vec<String>,
    pub initial_resource_versions: BTreeMap<String, String>,
    pub response_nonce: String,
    pub error_detail: Option<Status>,

    /// Stamped by the cache when the request hook runs; `None` before that.
    #[serde(skip)]
    pub sequence: Option<RequestSequence>,
}

impl DiscoveryMessage for DeltaDiscoveryRequest {
    fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    fn type_url(&self) -> &str {
        &self.type_url
    }

    fn response_nonce(&self) -> &str {
        &self.response_nonce
    }

    fn error_detail(&self) -> Option<&Status> {
        self.error_detail.as_ref()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeltaDiscoveryResponse {
    pub system_version_info: String,
    pub resources: Vec<Resource>,
    pub removed_resources: Vec<String>,
    pub type_url: String,
    pub nonce: String,
}
