//! Package id + version specification pairs

use std::fmt;

use crate::feed::error::VersionParseError;
use crate::feed::range::VersionRange;
use crate::feed::version::NuGetVersion;

/// A package id together with an exact version or a range expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentifier {
    pub id: String,
    /// Exact version (`1.0.0`), range (`[1.0,2.0)`), or empty for "any version"
    pub version_spec: String,
}

impl PackageIdentifier {
    pub fn new(id: impl Into<String>, version_spec: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version_spec: version_spec.into(),
        }
    }

    /// Identifier matching every version strictly newer than `version`
    pub fn newer_than(id: impl Into<String>, version: &NuGetVersion) -> Self {
        Self::new(id, VersionRange::greater_than(version.clone()).to_string())
    }

    pub fn has_range(&self) -> bool {
        self.version_spec.trim_start().starts_with(['[', '('])
    }

    pub fn has_version(&self) -> bool {
        !self.version_spec.trim().is_empty()
    }

    /// Lower bound of the spec, or the bare version itself
    ///
    /// Ranges without a lower bound yield 0.0.0.
    pub fn minimum_version(&self) -> Result<NuGetVersion, VersionParseError> {
        if self.has_range() {
            Ok(self.range()?.min.unwrap_or_default())
        } else {
            NuGetVersion::parse(&self.version_spec)
        }
    }

    /// The spec as a range; a bare version is an exact range
    pub fn range(&self) -> Result<VersionRange, VersionParseError> {
        VersionRange::parse(&self.version_spec)
    }

    /// Whether `version` satisfies this identifier's spec
    ///
    /// An empty spec accepts everything; an unparseable spec accepts nothing.
    pub fn matches(&self, version: &NuGetVersion) -> bool {
        if !self.has_version() {
            return true;
        }
        self.range()
            .map(|range| range.contains(version))
            .unwrap_or(false)
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_version() {
            write!(f, "{}@{}", self.id, self.version_spec)
        } else {
            f.write_str(&self.id)
        }
    }
}
