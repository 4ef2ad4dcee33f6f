//! Update resolution across one or more package sources

use std::time::Duration;

use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::feed::error::FeedError;
use crate::feed::identifier::PackageIdentifier;
use crate::feed::package::{Package, sort_for_updates};
use crate::feed::protocol::{SearchQuery, UpdateQuery};
use crate::feed::source::PackageSource;

/// Look up updates one installed package at a time
///
/// Used when a feed has no batch `GetUpdates` endpoint. Issues one
/// find-by-id request per installed package, asking for `(current, )`.
/// Per-package results keep the ascending order of
/// [`PackageSource::find_packages_by_id`].
pub async fn get_updates_fallback(
    source: &PackageSource,
    installed: &[Package],
    include_prerelease: bool,
    include_all_versions: bool,
) -> Vec<Package> {
    debug!(
        "[{}] Checking {} packages individually",
        source.name(),
        installed.len()
    );

    let mut updates = Vec::new();
    for current in installed {
        let identifier = PackageIdentifier::newer_than(current.id.clone(), &current.version);
        let mut newer: Vec<Package> = source
            .find_packages_by_id(&identifier)
            .await
            .into_iter()
            .filter(|p| include_prerelease || !p.is_prerelease)
            .collect();

        if include_all_versions {
            updates.append(&mut newer);
        } else if let Some(latest) = newer.pop() {
            updates.push(latest);
        }
    }
    updates
}

/// Append packages not already present, comparing `(id, version)`
fn merge_unique(target: &mut Vec<Package>, packages: Vec<Package>) {
    for package in packages {
        if !target.contains(&package) {
            target.push(package);
        }
    }
}

/// Queries every enabled source in configuration order and merges the results
///
/// When two sources offer the same `(id, version)`, the package from the
/// earlier source is kept.
pub struct UpdateResolver {
    sources: Vec<PackageSource>,
}

impl UpdateResolver {
    pub fn new(sources: Vec<PackageSource>) -> Self {
        Self { sources }
    }

    /// Build one HTTP-backed source per configured entry
    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let sources = config
            .sources
            .iter()
            .cloned()
            .map(|source| PackageSource::new(source, timeout))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(sources))
    }

    pub fn sources(&self) -> &[PackageSource] {
        &self.sources
    }

    /// Source a package's `SourceRef` points at
    pub fn source(&self, name: &str) -> Option<&PackageSource> {
        self.sources.iter().find(|source| source.name() == name)
    }

    fn enabled_sources(&self) -> impl Iterator<Item = &PackageSource> {
        self.sources.iter().filter(|source| source.is_enabled())
    }

    pub async fn get_updates(&self, installed: &[Package], query: &UpdateQuery) -> Vec<Package> {
        let mut updates = Vec::new();
        for source in self.enabled_sources() {
            merge_unique(&mut updates, source.get_updates(installed, query).await);
        }
        sort_for_updates(&mut updates);
        info!(
            "Found {} updates for {} installed packages",
            updates.len(),
            installed.len()
        );
        updates
    }

    pub async fn search(&self, query: &SearchQuery) -> Vec<Package> {
        let mut packages = Vec::new();
        for source in self.enabled_sources() {
            merge_unique(&mut packages, source.search(query).await);
        }
        packages
    }

    pub async fn find_packages_by_id(&self, identifier: &PackageIdentifier) -> Vec<Package> {
        let mut packages = Vec::new();
        for source in self.enabled_sources() {
            merge_unique(&mut packages, source.find_packages_by_id(identifier).await);
        }
        packages.sort();
        packages
    }

    /// First source that resolves `identifier` wins
    pub async fn get_specific_package(&self, identifier: &PackageIdentifier) -> Option<Package> {
        for source in self.enabled_sources() {
            if let Some(package) = source.get_specific_package(identifier).await {
                return Some(package);
            }
        }
        None
    }
}
