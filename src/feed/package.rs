//! Package records produced by feed queries

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::feed::identifier::PackageIdentifier;
use crate::feed::version::NuGetVersion;

/// Non-owning handle to the source a package came from
///
/// Holds only the source name; look the source up again to download from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef(Arc<str>);

impl SourceRef {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dependencies declared for one target framework
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameworkGroup {
    /// Target framework moniker (e.g., "net45", ".NETStandard2.0"); empty = any
    pub target_framework: String,
    pub dependencies: Vec<PackageIdentifier>,
}

impl FrameworkGroup {
    pub fn new(target_framework: impl Into<String>) -> Self {
        Self {
            target_framework: target_framework.into(),
            dependencies: Vec::new(),
        }
    }
}

/// Metadata for a single package version
///
/// Equality and ordering only look at `(id, version)`, so lists of packages can
/// be sorted and de-duplicated regardless of which source produced them.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub id: String,
    pub version: NuGetVersion,
    pub title: String,
    pub description: String,
    pub summary: String,
    pub authors: String,
    pub license_url: String,
    pub download_url: String,
    pub icon_url: String,
    /// Icon bytes, fetched for v3 feeds only
    pub icon: Option<Arc<Vec<u8>>>,
    pub download_count: u64,
    pub is_prerelease: bool,
    pub published: Option<DateTime<Utc>>,
    pub dependencies: Vec<FrameworkGroup>,
    pub source: Option<SourceRef>,
}

impl Package {
    pub fn new(id: impl Into<String>, version: NuGetVersion) -> Self {
        let is_prerelease = version.is_prerelease();
        Self {
            id: id.into(),
            version,
            is_prerelease,
            ..Default::default()
        }
    }

    /// Identifier pinning this exact package version
    pub fn identifier(&self) -> PackageIdentifier {
        PackageIdentifier::new(self.id.clone(), self.version.to_string())
    }

    /// Title if the feed provided one, otherwise the id
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.id
        } else {
            &self.title
        }
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.version == other.version
    }
}

impl Eq for Package {}

impl Ord for Package {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Sort ascending by id, newest version first within an id
pub fn sort_for_updates(packages: &mut [Package]) {
    packages.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| b.version.cmp(&a.version)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(id: &str, version: &str) -> Package {
        Package::new(id, NuGetVersion::parse(version).unwrap())
    }

    #[test]
    fn equality_ignores_source_and_metadata() {
        let mut a = pkg("Foo", "1.0.0");
        a.source = Some(SourceRef::new("first"));
        a.title = "Foo".to_string();
        let mut b = pkg("Foo", "1.0");
        b.source = Some(SourceRef::new("second"));

        assert_eq!(a, b);
    }

    #[test]
    fn ordering_is_by_id_then_version() {
        let mut packages = vec![
            pkg("Foo", "2.0.0"),
            pkg("Bar", "1.0.0"),
            pkg("Foo", "1.0.0"),
            pkg("Foo", "1.0.0-beta"),
        ];
        packages.sort();

        let rendered: Vec<String> = packages.iter().map(|p| p.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["Bar 1.0.0", "Foo 1.0.0-beta", "Foo 1.0.0", "Foo 2.0.0"]
        );
    }

    #[test]
    fn sort_for_updates_orders_versions_descending() {
        let mut packages = vec![
            pkg("Foo", "1.0.0"),
            pkg("Bar", "1.0.0"),
            pkg("Foo", "3.0.0"),
            pkg("Bar", "2.0.0"),
        ];
        sort_for_updates(&mut packages);

        let rendered: Vec<String> = packages.iter().map(|p| p.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["Bar 2.0.0", "Bar 1.0.0", "Foo 3.0.0", "Foo 1.0.0"]
        );
    }

    #[test]
    fn new_derives_prerelease_flag() {
        assert!(pkg("Foo", "1.0.0-rc.1").is_prerelease);
        assert!(!pkg("Foo", "1.0.0").is_prerelease);
    }

    #[test]
    fn display_title_falls_back_to_id() {
        let mut package = pkg("Foo", "1.0.0");
        assert_eq!(package.display_title(), "Foo");
        package.title = "Foo Library".to_string();
        assert_eq!(package.display_title(), "Foo Library");
    }
}
