//! Feed protocol abstraction
//!
//! Each wire protocol knows how to build its query URLs and how to turn a
//! response body into packages. Remote sources hold one protocol object and
//! never branch on the protocol version themselves.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DEFAULT_SEARCH_TAKE;
use crate::feed::error::{ConfigError, FeedError};
use crate::feed::fetch::Fetcher;
use crate::feed::package::Package;
use crate::feed::protocols::{V2OData, V3Json};
use crate::feed::range::VersionRange;

/// Feed protocol version as stored in configuration
///
/// Versions 0 and 1 are obsolete and read as 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ProtocolVersion {
    /// OData/Atom XML feeds
    V2,
    /// JSON search feeds
    V3,
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 | 1 => {
                warn!("Protocol version {} is obsolete, using 2", value);
                Ok(ProtocolVersion::V2)
            }
            2 => Ok(ProtocolVersion::V2),
            3 => Ok(ProtocolVersion::V3),
            other => Err(ConfigError::InvalidProtocolVersion(other)),
        }
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(value: ProtocolVersion) -> Self {
        match value {
            ProtocolVersion::V2 => 2,
            ProtocolVersion::V3 => 3,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", u8::from(*self))
    }
}

/// Parameters of a search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub include_all_versions: bool,
    pub include_prerelease: bool,
    pub take: usize,
    pub skip: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            term: String::new(),
            include_all_versions: false,
            include_prerelease: false,
            take: DEFAULT_SEARCH_TAKE,
            skip: 0,
        }
    }
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }
}

/// Parameters of an update query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateQuery {
    pub include_prerelease: bool,
    pub include_all_versions: bool,
    /// `|`-separated target frameworks, empty = any
    pub target_frameworks: String,
    /// `|`-separated version constraints aligned with the installed list
    pub version_constraints: String,
}

/// What the caller wants out of a response, so decoders can skip work
#[derive(Debug, Clone, Default)]
pub struct DecodeRequest {
    /// Produce one package per listed version instead of one per summary
    pub expand_versions: bool,
    /// Only packages with exactly this id are wanted
    pub id: Option<String>,
    /// Only versions inside this range are wanted
    pub range: Option<VersionRange>,
}

impl DecodeRequest {
    pub fn search() -> Self {
        Self::default()
    }

    pub fn find(id: &str, range: Option<VersionRange>) -> Self {
        Self {
            expand_versions: true,
            id: Some(id.to_string()),
            range,
        }
    }

    /// Whether a package with this id and version is worth resolving further
    pub fn wants(&self, package: &Package) -> bool {
        if let Some(id) = &self.id
            && &package.id != id
        {
            return false;
        }
        self.range
            .as_ref()
            .is_none_or(|range| range.contains(&package.version))
    }
}

/// Wire protocol of a remote feed
#[async_trait::async_trait]
pub trait FeedProtocol: Send + Sync {
    fn version(&self) -> ProtocolVersion;

    /// URL listing versions of one package id, optionally pinned to `version`
    fn find_by_id_url(&self, base: &str, id: &str, version: Option<&str>) -> String;

    fn search_url(&self, base: &str, query: &SearchQuery) -> String;

    /// URL for a batched update check, or None if the protocol has no such endpoint
    fn updates_url(&self, base: &str, installed: &[Package], query: &UpdateQuery)
    -> Option<String>;

    /// Decode a response body into packages, fetching further resources if needed
    async fn decode(
        &self,
        body: &[u8],
        fetcher: &dyn Fetcher,
        request: &DecodeRequest,
    ) -> Result<Vec<Package>, FeedError>;
}

/// Protocol implementation for a configured protocol version
pub fn protocol_for(
    version: ProtocolVersion,
    empty_search_placeholder: Option<String>,
) -> Arc<dyn FeedProtocol> {
    match version {
        ProtocolVersion::V2 => Arc::new(V2OData),
        ProtocolVersion::V3 => Arc::new(V3Json::new(empty_search_placeholder)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::version::NuGetVersion;
    use rstest::rstest;

    #[rstest]
    #[case(0, ProtocolVersion::V2)]
    #[case(1, ProtocolVersion::V2)]
    #[case(2, ProtocolVersion::V2)]
    #[case(3, ProtocolVersion::V3)]
    fn protocol_version_coerces_obsolete_values(
        #[case] raw: u8,
        #[case] expected: ProtocolVersion,
    ) {
        assert_eq!(ProtocolVersion::try_from(raw).unwrap(), expected);
    }

    #[test]
    fn protocol_version_rejects_unknown_values() {
        assert!(matches!(
            ProtocolVersion::try_from(4),
            Err(ConfigError::InvalidProtocolVersion(4))
        ));
    }

    #[test]
    fn protocol_version_round_trips_through_json() {
        let parsed: ProtocolVersion = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, ProtocolVersion::V2);
        assert_eq!(serde_json::to_string(&ProtocolVersion::V3).unwrap(), "3");
    }

    #[test]
    fn search_query_defaults_to_fifteen_results() {
        let query = SearchQuery::default();
        assert_eq!(query.take, 15);
        assert_eq!(query.skip, 0);
        assert!(query.term.is_empty());
    }

    #[test]
    fn decode_request_filters_by_id_and_range() {
        let request = DecodeRequest::find("Foo", Some(VersionRange::parse("(1.0,)").unwrap()));
        let version = |s: &str| NuGetVersion::parse(s).unwrap();

        assert!(request.wants(&Package::new("Foo", version("2.0"))));
        assert!(!request.wants(&Package::new("Foo", version("1.0"))));
        assert!(!request.wants(&Package::new("Bar", version("2.0"))));
        assert!(DecodeRequest::search().wants(&Package::new("Bar", version("2.0"))));
    }

    #[test]
    fn protocol_for_selects_implementation() {
        assert_eq!(
            protocol_for(ProtocolVersion::V2, None).version(),
            ProtocolVersion::V2
        );
        assert_eq!(
            protocol_for(ProtocolVersion::V3, None).version(),
            ProtocolVersion::V3
        );
    }
}
