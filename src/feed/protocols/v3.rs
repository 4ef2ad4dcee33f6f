//! NuGet v3 (JSON) protocol
//!
//! Search summaries do not carry everything a package record needs. Each
//! candidate is resolved in up to three sequential hops:
//!
//! ```text
//! search summary ──▶ registration leaf ──▶ catalog entry
//!  (id, version,      (packageContent,      (dependencyGroups,
//!   versions[@id])     catalogEntry)         published)
//! ```
//!
//! The catalog entry is either inlined in the leaf or referenced by URL.
//! Only the first fetch (done by the caller) is mandatory; failures in later
//! hops leave the package with what the summary provided. Icons are fetched
//! once per distinct URL after all candidates are resolved.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::feed::error::FeedError;
use crate::feed::fetch::Fetcher;
use crate::feed::identifier::PackageIdentifier;
use crate::feed::package::{FrameworkGroup, Package};
use crate::feed::protocol::{DecodeRequest, FeedProtocol, ProtocolVersion, SearchQuery, UpdateQuery};
use crate::feed::protocols::parse_timestamp;
use crate::feed::version::NuGetVersion;

/// Candidates resolved at the same time within one decode
const MAX_CONCURRENT_RESOLVES: usize = 8;

/// JSON search feed protocol (`query?q=`)
pub struct V3Json {
    /// Term sent instead of an empty search, for servers that reject `q=`
    empty_search_placeholder: Option<String>,
}

impl V3Json {
    pub fn new(empty_search_placeholder: Option<String>) -> Self {
        Self {
            empty_search_placeholder: empty_search_placeholder.filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SearchResult {
    id: String,
    version: String,
    title: Option<String>,
    description: Option<String>,
    summary: Option<String>,
    authors: Option<Value>,
    icon_url: Option<String>,
    license_url: Option<String>,
    package_content: Option<String>,
    total_downloads: Option<u64>,
    versions: Vec<SearchVersion>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchVersion {
    version: String,
    downloads: Option<u64>,
    #[serde(rename = "@id")]
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RegistrationLeaf {
    catalog_entry: Option<Value>,
    package_content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct CatalogEntry {
    dependency_groups: Vec<DependencyGroup>,
    published: Option<String>,
    package_content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DependencyGroup {
    target_framework: Option<String>,
    dependencies: Vec<Dependency>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Dependency {
    id: String,
    range: Option<String>,
}

impl CatalogEntry {
    fn framework_groups(&self) -> Vec<FrameworkGroup> {
        self.dependency_groups
            .iter()
            .map(|group| FrameworkGroup {
                target_framework: group.target_framework.clone().unwrap_or_default(),
                dependencies: group
                    .dependencies
                    .iter()
                    .filter(|d| !d.id.is_empty())
                    .map(|d| {
                        PackageIdentifier::new(d.id.clone(), d.range.clone().unwrap_or_default())
                    })
                    .collect(),
            })
            .collect()
    }
}

/// A package from the search summary plus where to continue resolving it
#[derive(Debug)]
struct Candidate {
    package: Package,
    leaf_url: Option<String>,
}

fn authors_text(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Package fields shared by every version listed under one summary
fn summary_package(result: &SearchResult, version: NuGetVersion) -> Package {
    let mut package = Package::new(result.id.clone(), version);
    package.title = result.title.clone().unwrap_or_default();
    package.description = result.description.clone().unwrap_or_default();
    package.summary = result.summary.clone().unwrap_or_default();
    package.authors = authors_text(&result.authors);
    package.icon_url = result.icon_url.clone().unwrap_or_default();
    package.license_url = result.license_url.clone().unwrap_or_default();
    package.download_count = result.total_downloads.unwrap_or(0);
    package.download_url = result.package_content.clone().unwrap_or_default();
    package
}

fn parse_candidates(body: &[u8], request: &DecodeRequest) -> Result<Vec<Candidate>, FeedError> {
    let response: SearchResponse = serde_json::from_slice(body)?;
    let mut candidates = Vec::new();

    for result in &response.data {
        if request.expand_versions && !result.versions.is_empty() {
            let summary_version = NuGetVersion::parse(&result.version).ok();
            for listed in &result.versions {
                let Ok(version) = NuGetVersion::parse(&listed.version).inspect_err(|e| {
                    warn!("Skipping {} version '{}': {}", result.id, listed.version, e)
                }) else {
                    continue;
                };
                let mut package = summary_package(result, version);
                package.download_count = listed.downloads.unwrap_or(0);
                // packageContent on the summary only points at the summary's own version
                if summary_version.as_ref() != Some(&package.version) {
                    package.download_url.clear();
                }
                candidates.push(Candidate {
                    package,
                    leaf_url: non_empty(listed.id.clone()),
                });
            }
        } else {
            let Ok(version) = NuGetVersion::parse(&result.version).inspect_err(|e| {
                warn!("Skipping {} version '{}': {}", result.id, result.version, e)
            }) else {
                continue;
            };
            let leaf_url = result
                .versions
                .iter()
                .find(|listed| {
                    NuGetVersion::parse(&listed.version).is_ok_and(|v| v == version)
                })
                .and_then(|listed| non_empty(listed.id.clone()));
            candidates.push(Candidate {
                package: summary_package(result, version),
                leaf_url,
            });
        }
    }

    candidates.retain(|candidate| request.wants(&candidate.package));
    Ok(candidates)
}

/// Read the catalog entry of a registration leaf, following a URL reference
pub(crate) async fn resolve_catalog_entry(
    entry: Value,
    fetcher: &dyn Fetcher,
) -> Result<CatalogEntry, FeedError> {
    match entry {
        Value::String(url) => {
            let body = fetcher.fetch(&url).await?;
            Ok(serde_json::from_slice(&body)?)
        }
        Value::Object(_) => Ok(serde_json::from_value(entry)?),
        other => Err(FeedError::InvalidResponse(format!(
            "Unexpected catalogEntry value: {}",
            other
        ))),
    }
}

async fn resolve_leaf(package: &mut Package, leaf_url: &str, fetcher: &dyn Fetcher) {
    let leaf: RegistrationLeaf = match fetcher.fetch(leaf_url).await {
        Ok(body) => match serde_json::from_slice(&body) {
            Ok(leaf) => leaf,
            Err(e) => {
                warn!("Invalid registration leaf for {}: {}", package, e);
                return;
            }
        },
        Err(e) => {
            warn!("Failed to fetch registration leaf for {}: {}", package, e);
            return;
        }
    };

    if let Some(content) = non_empty(leaf.package_content) {
        package.download_url = content;
    }

    let Some(entry) = leaf.catalog_entry else {
        debug!("Registration leaf for {} has no catalog entry", package);
        return;
    };

    match resolve_catalog_entry(entry, fetcher).await {
        Ok(catalog) => {
            if package.download_url.is_empty()
                && let Some(content) = non_empty(catalog.package_content.clone())
            {
                package.download_url = content;
            }
            package.dependencies = catalog.framework_groups();
            if let Some(published) = catalog.published.as_deref().and_then(parse_timestamp) {
                package.published = Some(published);
            }
        }
        Err(e) => warn!("Failed to resolve catalog entry for {}: {}", package, e),
    }
}

/// Fetch every distinct icon URL once and share the bytes between packages
async fn attach_icons(packages: &mut [Package], fetcher: &dyn Fetcher) {
    let mut icons: HashMap<String, Option<Arc<Vec<u8>>>> = HashMap::new();
    for package in packages.iter_mut() {
        if package.icon_url.is_empty() {
            continue;
        }
        if !icons.contains_key(&package.icon_url) {
            let icon = match fetcher.fetch(&package.icon_url).await {
                Ok(bytes) => Some(Arc::new(bytes)),
                Err(e) => {
                    debug!("Failed to fetch icon for {}: {}", package, e);
                    None
                }
            };
            icons.insert(package.icon_url.clone(), icon);
        }
        package.icon = icons.get(&package.icon_url).cloned().flatten();
    }
}

async fn resolve_candidate(candidate: Candidate, fetcher: &dyn Fetcher) -> Package {
    let Candidate {
        mut package,
        leaf_url,
    } = candidate;

    if let Some(leaf_url) = leaf_url {
        resolve_leaf(&mut package, &leaf_url, fetcher).await;
    }

    package
}

#[async_trait::async_trait]
impl FeedProtocol for V3Json {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V3
    }

    fn find_by_id_url(&self, base: &str, id: &str, _version: Option<&str>) -> String {
        format!(
            "{}query?q=packageid:{}&prerelease=true",
            base,
            urlencoding::encode(id)
        )
    }

    fn search_url(&self, base: &str, query: &SearchQuery) -> String {
        let term = match (&self.empty_search_placeholder, query.term.is_empty()) {
            (Some(placeholder), true) => placeholder.as_str(),
            _ => query.term.as_str(),
        };
        format!(
            "{}query?q={}&prerelease={}",
            base,
            urlencoding::encode(term),
            query.include_prerelease
        )
    }

    fn updates_url(
        &self,
        _base: &str,
        _installed: &[Package],
        _query: &UpdateQuery,
    ) -> Option<String> {
        None
    }

    async fn decode(
        &self,
        body: &[u8],
        fetcher: &dyn Fetcher,
        request: &DecodeRequest,
    ) -> Result<Vec<Package>, FeedError> {
        let candidates = parse_candidates(body, request)?;
        debug!("Resolving {} v3 candidates", candidates.len());

        // Hops within one candidate are sequential. `buffered` keeps feed order.
        let mut packages: Vec<Package> = stream::iter(candidates)
            .map(|candidate| resolve_candidate(candidate, fetcher))
            .buffered(MAX_CONCURRENT_RESOLVES)
            .collect()
            .await;
        attach_icons(&mut packages, fetcher).await;

        Ok(packages)
    }
}
