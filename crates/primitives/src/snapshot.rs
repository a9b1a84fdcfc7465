use core::fmt;
use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type URLs of the resource kinds a snapshot may carry.
pub mod type_url {
    pub const CLUSTER: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
    pub const ENDPOINT: &str = "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
    pub const LISTENER: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
    pub const ROUTE: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
    pub const SCOPED_ROUTE: &str =
        "type.googleapis.com/envoy.config.route.v3.ScopedRouteConfiguration";
    pub const VIRTUAL_HOST: &str = "type.googleapis.com/envoy.config.route.v3.VirtualHost";
    pub const SECRET: &str =
        "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret";
    pub const RUNTIME: &str = "type.googleapis.com/envoy.service.runtime.v3.Runtime";
    pub const EXTENSION_CONFIG: &str =
        "type.googleapis.com/envoy.config.core.v3.TypedExtensionConfig";

    pub const ALL: &[&str] = &[
        CLUSTER,
        ENDPOINT,
        LISTENER,
        ROUTE,
        SCOPED_ROUTE,
        VIRTUAL_HOST,
        SECRET,
        RUNTIME,
        EXTENSION_CONFIG,
    ];

    #[must_use]
    pub fn is_known(type_url: &str) -> bool {
        ALL.contains(&type_url)
    }
}

/// One named, already-encoded configuration entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub body: Bytes,
}

impl Resource {
    #[must_use]
    pub fn new(name: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// Output of the resource generation pipeline: resources grouped by type URL.
pub type ResourceTable = BTreeMap<String, Vec<Resource>>;

/// Opaque, strictly ordered token identifying one snapshot generation.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("unknown resource type: {type_url}")]
    UnknownResourceType { type_url: String },
}

/// Immutable, versioned bundle of resources.
///
/// Snapshots are never edited once built. A newer generation supersedes an
/// older one by replacing it wherever it is stored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Snapshot {
    version: Version,
    resources: ResourceTable,
}

impl Snapshot {
    /// Assembles a snapshot, rejecting resource types no proxy understands.
    pub fn new(version: Version, resources: ResourceTable) -> Result<Self, SnapshotError> {
        if let Some(type_url) = resources.keys().find(|url| !type_url::is_known(url)) {
            return Err(SnapshotError::UnknownResourceType {
                type_url: type_url.clone(),
            });
        }

        Ok(Self { version, resources })
    }

    #[must_use]
    pub const fn version(&self) -> &Version {
        &self.version
    }

    #[must_use]
    pub fn resources(&self, type_url: &str) -> Option<&[Resource]> {
        self.resources.get(type_url).map(Vec::as_slice)
    }

    pub fn type_urls(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn resource_names<'a>(&'a self, type_url: &str) -> impl Iterator<Item = &'a str> {
        self.resources(type_url)
            .unwrap_or_default()
            .iter()
            .map(|resource| resource.name.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.values().all(Vec::is_empty)
    }
}
