use serde::{Deserialize, Serialize};

/// A remote proxy instance, as identified by the first request on a stream.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Peer-supplied identifier. Required on the first request of a stream.
    pub id: String,

    /// Logical group whose snapshot this node should receive.
    pub group: String,

    #[serde(default)]
    pub user_agent_build_version: Option<BuildVersion>,
}

impl Node {
    #[must_use]
    pub fn new(id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            user_agent_build_version: None,
        }
    }

    #[must_use]
    pub fn with_build_version(mut self, build_version: BuildVersion) -> Self {
        self.user_agent_build_version = Some(build_version);
        self
    }

    /// Human readable build version of the peer, `v<major>.<minor>.<patch>`,
    /// or an empty string when the peer did not report one.
    #[must_use]
    pub fn build_version(&self) -> String {
        self.user_agent_build_version
            .as_ref()
            .and_then(|build| build.version)
            .map(|version| version.to_string())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BuildVersion {
    pub version: Option<SemanticVersion>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub major_number: u32,
    pub minor_number: u32,
    pub patch: u32,
}

impl SemanticVersion {
    #[must_use]
    pub const fn new(major_number: u32, minor_number: u32, patch: u32) -> Self {
        Self {
            major_number,
            minor_number,
            patch,
        }
    }
}

impl core::fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "v{}.{}.{}",
            self.major_number, self.minor_number, self.patch
        )
    }
}
