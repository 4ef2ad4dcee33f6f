//! Configured package sources and their query operations

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::config::{SourceConfig, UPDATE_BATCH_SIZE};
use crate::feed::error::FeedError;
use crate::feed::fetch::{FetchOptions, Fetcher, HttpFetcher};
use crate::feed::identifier::PackageIdentifier;
use crate::feed::local::LocalDirectory;
use crate::feed::package::{Package, SourceRef, sort_for_updates};
use crate::feed::protocol::{
    DecodeRequest, FeedProtocol, ProtocolVersion, SearchQuery, UpdateQuery, protocol_for,
};
use crate::feed::range::VersionRange;
use crate::feed::resolver::get_updates_fallback;
use crate::feed::version::NuGetVersion;

const FILE_SCHEME: &str = "file://";

/// Whether a configured path names a directory rather than an HTTP(S) feed
pub fn is_local_path(path: &str) -> bool {
    let lower = path.trim().to_ascii_lowercase();
    !(lower.starts_with("http://") || lower.starts_with("https://"))
}

/// One configured feed: a local directory or a remote URL
///
/// All query operations log failures and return empty results; callers never
/// see transport errors.
pub struct PackageSource {
    config: SourceConfig,
    source_ref: SourceRef,
    fetcher: Arc<dyn Fetcher>,
    protocol: Arc<dyn FeedProtocol>,
}

impl PackageSource {
    /// Create a source with its own HTTP client
    pub fn new(config: SourceConfig, timeout: Duration) -> Result<Self, FeedError> {
        let options = FetchOptions {
            user_name: config.user_name.clone(),
            password: config.password.clone(),
            timeout,
            ..FetchOptions::default()
        };
        let fetcher = HttpFetcher::new(options)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: SourceConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let protocol = protocol_for(
            config.protocol_version,
            config.empty_search_placeholder.clone(),
        );
        Self {
            source_ref: SourceRef::new(&config.name),
            config,
            fetcher,
            protocol,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.config.protocol_version
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_local_path(&self) -> bool {
        is_local_path(&self.config.path)
    }

    pub fn source_ref(&self) -> &SourceRef {
        &self.source_ref
    }

    /// Feed URL with a trailing slash, ready for endpoint names
    pub fn base_url(&self) -> String {
        let path = self.config.path.trim();
        if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        }
    }

    fn local_directory(&self) -> LocalDirectory {
        let path = self.config.path.trim();
        let path = path
            .get(..FILE_SCHEME.len())
            .filter(|scheme| scheme.eq_ignore_ascii_case(FILE_SCHEME))
            .map_or(path, |_| &path[FILE_SCHEME.len()..]);
        LocalDirectory::new(path)
    }

    fn attach(&self, packages: &mut [Package]) {
        for package in packages {
            package.source = Some(self.source_ref.clone());
        }
    }

    async fn fetch_and_decode(
        &self,
        url: &str,
        request: &DecodeRequest,
    ) -> Result<Vec<Package>, FeedError> {
        let body = self.fetcher.fetch(url).await?;
        self.protocol
            .decode(&body, self.fetcher.as_ref(), request)
            .await
    }

    /// All versions of `identifier.id` inside its version spec, ascending
    pub async fn find_packages_by_id(&self, identifier: &PackageIdentifier) -> Vec<Package> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let result = if self.is_local_path() {
            self.find_local(identifier)
        } else {
            self.find_remote(identifier).await
        };

        let mut packages = match result {
            Ok(packages) => packages,
            Err(e) => {
                warn!("[{}] Failed to find {}: {}", self.name(), identifier, e);
                return Vec::new();
            }
        };

        packages.retain(|p| p.id == identifier.id && identifier.matches(&p.version));
        packages.sort();
        self.attach(&mut packages);
        debug!(
            "[{}] Found {} versions for {}",
            self.name(),
            packages.len(),
            identifier
        );
        packages
    }

    fn find_local(&self, identifier: &PackageIdentifier) -> Result<Vec<Package>, FeedError> {
        let directory = self.local_directory();
        if identifier.has_version() && !identifier.has_range() {
            let Ok(version) = NuGetVersion::parse(&identifier.version_spec) else {
                warn!("[{}] Invalid version in {}", self.name(), identifier);
                return Ok(Vec::new());
            };
            return Ok(directory
                .find_exact(&identifier.id, &version)?
                .into_iter()
                .collect());
        }
        directory.packages(Some(&identifier.id))
    }

    async fn find_remote(&self, identifier: &PackageIdentifier) -> Result<Vec<Package>, FeedError> {
        let exact_version = (identifier.has_version() && !identifier.has_range())
            .then(|| identifier.version_spec.trim());
        let url = self
            .protocol
            .find_by_id_url(&self.base_url(), &identifier.id, exact_version);

        let range = if identifier.has_version() {
            identifier.range().ok()
        } else {
            None
        };
        let request = DecodeRequest::find(&identifier.id, range);
        self.fetch_and_decode(&url, &request).await
    }

    /// The single best match for `identifier`
    ///
    /// Ranges on v2 and local sources take the lowest matching version.
    /// Otherwise the candidate equal to the minimum version wins, then the
    /// first candidate above it. Remote candidates keep the order the feed
    /// returned them in; local candidates are sorted ascending first.
    /// A range with an exclusive lower bound never yields that bound.
    pub async fn get_specific_package(&self, identifier: &PackageIdentifier) -> Option<Package> {
        if !self.is_enabled() {
            return None;
        }

        if identifier.has_range()
            && (self.is_local_path() || self.protocol_version() == ProtocolVersion::V2)
        {
            return self.find_packages_by_id(identifier).await.into_iter().next();
        }

        let minimum = match identifier.minimum_version() {
            Ok(minimum) => minimum,
            Err(e) => {
                error!("[{}] Invalid version in {}: {}", self.name(), identifier, e);
                return None;
            }
        };

        let candidates = if self.is_local_path() {
            let directory = self.local_directory();
            match directory.find_exact(&identifier.id, &minimum) {
                Ok(Some(package)) => Ok(vec![package]),
                Ok(None) => directory.packages(Some(&identifier.id)).map(|mut packages| {
                    // Directory listing order is platform dependent
                    packages.sort();
                    packages
                }),
                Err(e) => Err(e),
            }
        } else {
            let version = if identifier.has_range() {
                minimum.to_string()
            } else {
                identifier.version_spec.trim().to_string()
            };
            let url = self
                .protocol
                .find_by_id_url(&self.base_url(), &identifier.id, Some(&version));
            let range = match identifier.range() {
                Ok(range) if identifier.has_range() => range,
                _ => VersionRange::at_least(minimum.clone()),
            };
            let request = DecodeRequest::find(&identifier.id, Some(range));
            self.fetch_and_decode(&url, &request).await
        };

        let candidates = match candidates {
            Ok(candidates) if identifier.has_range() => candidates
                .into_iter()
                .filter(|p| identifier.matches(&p.version))
                .collect(),
            Ok(candidates) => candidates,
            Err(e) => {
                error!("[{}] Failed to get {}: {}", self.name(), identifier, e);
                return None;
            }
        };

        let mut package = select_closest(candidates, &identifier.id, &minimum).or_else(|| {
            error!(
                "[{}] No version of {} at or above {}",
                self.name(),
                identifier.id,
                minimum
            );
            None
        })?;
        package.source = Some(self.source_ref.clone());
        Some(package)
    }

    /// Search packages by term
    ///
    /// An empty term lists everything the feed offers.
    pub async fn search(&self, query: &SearchQuery) -> Vec<Package> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let result = if self.is_local_path() {
            self.search_local(query)
        } else {
            let url = self.protocol.search_url(&self.base_url(), query);
            self.fetch_and_decode(&url, &DecodeRequest::search()).await
        };

        match result {
            Ok(mut packages) => {
                self.attach(&mut packages);
                debug!(
                    "[{}] Search '{}' returned {} packages",
                    self.name(),
                    query.term,
                    packages.len()
                );
                packages
            }
            Err(e) => {
                warn!("[{}] Search '{}' failed: {}", self.name(), query.term, e);
                Vec::new()
            }
        }
    }

    fn search_local(&self, query: &SearchQuery) -> Result<Vec<Package>, FeedError> {
        let term = query.term.trim().to_lowercase();
        let mut packages: Vec<Package> = self
            .local_directory()
            .packages(None)?
            .into_iter()
            .filter(|p| query.include_prerelease || !p.is_prerelease)
            .filter(|p| {
                term.is_empty()
                    || p.id.to_lowercase().contains(&term)
                    || p.title.to_lowercase().contains(&term)
            })
            .collect();
        packages.sort();

        if !query.include_all_versions {
            // Ascending order means the last insert per id is the latest
            let mut latest: IndexMap<String, Package> = IndexMap::new();
            for package in packages {
                latest.insert(package.id.clone(), package);
            }
            packages = latest.into_values().collect();
        }

        Ok(packages
            .into_iter()
            .skip(query.skip)
            .take(query.take)
            .collect())
    }

    /// Available updates for `installed`, by id ascending and newest first
    ///
    /// Remote feeds are asked in batches through `GetUpdates`. When the feed
    /// lacks that endpoint, every installed package is looked up on its own.
    pub async fn get_updates(&self, installed: &[Package], query: &UpdateQuery) -> Vec<Package> {
        if !self.is_enabled() || installed.is_empty() {
            return Vec::new();
        }

        let mut updates = if self.is_local_path() {
            match self.local_updates(installed, query) {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("[{}] Failed to check updates: {}", self.name(), e);
                    return Vec::new();
                }
            }
        } else {
            match self.remote_updates(installed, query).await {
                Some(updates) => updates,
                None => {
                    get_updates_fallback(
                        self,
                        installed,
                        query.include_prerelease,
                        query.include_all_versions,
                    )
                    .await
                }
            }
        };

        sort_for_updates(&mut updates);
        self.attach(&mut updates);
        updates
    }

    /// Batched `GetUpdates`; None means the fallback has to take over
    async fn remote_updates(
        &self,
        installed: &[Package],
        query: &UpdateQuery,
    ) -> Option<Vec<Package>> {
        let base = self.base_url();
        let constraints: Vec<&str> = if query.version_constraints.is_empty() {
            Vec::new()
        } else {
            query.version_constraints.split('|').collect()
        };

        let mut updates = Vec::new();
        for (index, batch) in installed.chunks(UPDATE_BATCH_SIZE).enumerate() {
            let start = index * UPDATE_BATCH_SIZE;
            let batch_query = UpdateQuery {
                version_constraints: batch_constraints(&constraints, start, batch.len()),
                ..query.clone()
            };

            let Some(url) = self.protocol.updates_url(&base, batch, &batch_query) else {
                debug!(
                    "[{}] {} feeds have no GetUpdates endpoint",
                    self.name(),
                    self.protocol_version()
                );
                return None;
            };

            match self.fetch_and_decode(&url, &DecodeRequest::search()).await {
                Ok(packages) => updates.extend(packages),
                Err(e) if e.is_not_found() => {
                    info!(
                        "[{}] GetUpdates is not available, checking packages one by one",
                        self.name()
                    );
                    return None;
                }
                Err(e) => warn!(
                    "[{}] GetUpdates batch {} failed: {}",
                    self.name(),
                    index,
                    e
                ),
            }
        }

        Some(updates)
    }

    fn local_updates(
        &self,
        installed: &[Package],
        query: &UpdateQuery,
    ) -> Result<Vec<Package>, FeedError> {
        let available = self.local_directory().packages(None)?;

        let mut updates = Vec::new();
        for current in installed {
            let mut newer: Vec<Package> = available
                .iter()
                .filter(|p| p.id == current.id && p.version > current.version)
                .filter(|p| query.include_prerelease || !p.is_prerelease)
                .cloned()
                .collect();
            newer.sort();
            newer.dedup();

            if query.include_all_versions {
                updates.extend(newer);
            } else if let Some(latest) = newer.pop() {
                updates.push(latest);
            }
        }
        Ok(updates)
    }
}

/// Slice of the `|`-separated constraints belonging to one batch
fn batch_constraints(constraints: &[&str], start: usize, len: usize) -> String {
    constraints
        .iter()
        .skip(start)
        .take(len)
        .copied()
        .collect::<Vec<_>>()
        .join("|")
}

/// Exact match first, then the first candidate above `minimum` in feed order
fn select_closest(candidates: Vec<Package>, id: &str, minimum: &NuGetVersion) -> Option<Package> {
    let mut candidates: Vec<Package> = candidates.into_iter().filter(|p| p.id == id).collect();
    let index = candidates
        .iter()
        .position(|p| &p.version == minimum)
        .or_else(|| candidates.iter().position(|p| &p.version > minimum))?;
    Some(candidates.swap_remove(index))
}
