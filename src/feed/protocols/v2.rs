//! NuGet v2 (OData/Atom) protocol

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use crate::feed::error::FeedError;
use crate::feed::fetch::Fetcher;
use crate::feed::identifier::PackageIdentifier;
use crate::feed::package::{FrameworkGroup, Package};
use crate::feed::protocol::{DecodeRequest, FeedProtocol, ProtocolVersion, SearchQuery, UpdateQuery};
use crate::feed::protocols::{encode_literal, parse_timestamp};
use crate::feed::version::NuGetVersion;

/// OData feed protocol (`FindPackagesById()`, `Search()`, `GetUpdates()`)
pub struct V2OData;

#[async_trait::async_trait]
impl FeedProtocol for V2OData {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V2
    }

    fn find_by_id_url(&self, base: &str, id: &str, version: Option<&str>) -> String {
        let mut url = format!(
            "{}FindPackagesById()?id='{}'&$orderby=Id%20desc",
            base,
            encode_literal(id)
        );
        if let Some(version) = version {
            url.push_str(&format!(
                "&$filter=Version%20eq%20'{}'",
                encode_literal(version)
            ));
        }
        url
    }

    fn search_url(&self, base: &str, query: &SearchQuery) -> String {
        let mut url = format!("{}Search()?", base);
        if !query.include_all_versions {
            let filter = if query.include_prerelease {
                "IsAbsoluteLatestVersion"
            } else {
                "IsLatestVersion"
            };
            url.push_str(&format!("$filter={}&", filter));
        }
        url.push_str(&format!(
            "$skip={}&$orderby=DownloadCount%20desc&$top={}&searchTerm='{}'&targetFramework=''&includePrerelease={}",
            query.skip,
            query.take,
            encode_literal(&query.term),
            query.include_prerelease
        ));
        url
    }

    fn updates_url(
        &self,
        base: &str,
        installed: &[Package],
        query: &UpdateQuery,
    ) -> Option<String> {
        let ids = installed
            .iter()
            .map(|p| p.id.as_str())
            .collect::<Vec<_>>()
            .join("|");
        let versions = installed
            .iter()
            .map(|p| p.version.to_string())
            .collect::<Vec<_>>()
            .join("|");

        Some(format!(
            "{}GetUpdates()?packageIds='{}'&versions='{}'&includePrerelease={}&includeAllVersions={}&targetFrameworks='{}'&versionConstraints='{}'",
            base,
            encode_literal(&ids),
            encode_literal(&versions),
            query.include_prerelease,
            query.include_all_versions,
            encode_literal(&query.target_frameworks),
            encode_literal(&query.version_constraints)
        ))
    }

    async fn decode(
        &self,
        body: &[u8],
        _fetcher: &dyn Fetcher,
        _request: &DecodeRequest,
    ) -> Result<Vec<Package>, FeedError> {
        decode_feed(body)
    }
}

/// Text collected for one `<entry>`
#[derive(Debug, Default)]
struct EntryFields {
    /// Atom-level elements (`title`, `summary`, `name`, ...)
    atom: HashMap<String, String>,
    /// `m:properties` children keyed by local name (`Id`, `Version`, ...)
    properties: HashMap<String, String>,
    content_src: Option<String>,
}

impl EntryFields {
    fn push_text(&mut self, element: &str, in_properties: bool, text: &str) {
        let target = if in_properties {
            &mut self.properties
        } else {
            &mut self.atom
        };
        target.entry(element.to_string()).or_default().push_str(text);
    }

    fn property(&self, name: &str) -> &str {
        self.properties.get(name).map(String::as_str).unwrap_or("")
    }

    fn atom(&self, name: &str) -> &str {
        self.atom.get(name).map(String::as_str).unwrap_or("")
    }

    fn into_package(self) -> Option<Package> {
        let id = match self.property("Id") {
            "" => self.atom("title"),
            id => id,
        }
        .trim()
        .to_string();

        let raw_version = self.property("Version");
        let version = match NuGetVersion::parse(raw_version) {
            Ok(version) => version,
            Err(e) => {
                warn!("Skipping feed entry '{}': {}", id, e);
                return None;
            }
        };

        if id.is_empty() {
            warn!("Skipping feed entry without id (version {})", version);
            return None;
        }

        let mut package = Package::new(id, version);
        package.title = self.property("Title").to_string();
        package.description = self.property("Description").to_string();
        package.summary = match self.property("Summary") {
            "" => self.atom("summary"),
            summary => summary,
        }
        .to_string();
        package.authors = match self.property("Authors") {
            "" => self.atom("name"),
            authors => authors,
        }
        .to_string();
        package.license_url = self.property("LicenseUrl").to_string();
        package.icon_url = self.property("IconUrl").to_string();
        package.download_count = self.property("DownloadCount").trim().parse().unwrap_or(0);
        if let Ok(flag) = self.property("IsPrerelease").trim().parse::<bool>() {
            package.is_prerelease = flag;
        }
        package.published = parse_timestamp(self.property("Published"));
        package.dependencies = parse_dependencies(self.property("Dependencies"));
        package.download_url = self.content_src.unwrap_or_default();

        Some(package)
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn content_source(element: &BytesStart<'_>) -> Result<Option<String>, FeedError> {
    for attribute in element.attributes().flatten() {
        if attribute.key.local_name().as_ref() == b"src" {
            let value = attribute
                .unescape_value()
                .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Decode an Atom feed of OData package entries
///
/// Missing optional properties default to empty values; entries without a
/// usable id or version are skipped.
pub fn decode_feed(body: &[u8]) -> Result<Vec<Package>, FeedError> {
    let text =
        std::str::from_utf8(body).map_err(|e| FeedError::InvalidResponse(e.to_string()))?;
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut packages = Vec::new();
    let mut entry: Option<EntryFields> = None;
    let mut element: Option<String> = None;
    let mut in_properties = false;
    let mut saw_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                saw_root = true;
                let name = local_name(&start);
                match name.as_str() {
                    "entry" => entry = Some(EntryFields::default()),
                    "properties" => in_properties = true,
                    "content" => {
                        if let Some(fields) = entry.as_mut() {
                            fields.content_src = content_source(&start)?;
                        }
                    }
                    _ => {}
                }
                element = Some(name);
            }
            Event::Empty(empty) => {
                saw_root = true;
                if local_name(&empty) == "content"
                    && let Some(fields) = entry.as_mut()
                {
                    fields.content_src = content_source(&empty)?;
                }
            }
            Event::Text(text) => {
                if let (Some(fields), Some(name)) = (entry.as_mut(), element.as_deref()) {
                    let value = text
                        .unescape()
                        .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;
                    fields.push_text(name, in_properties, &value);
                }
            }
            Event::CData(data) => {
                if let (Some(fields), Some(name)) = (entry.as_mut(), element.as_deref()) {
                    fields.push_text(name, in_properties, &String::from_utf8_lossy(&data));
                }
            }
            Event::End(end) => {
                match end.local_name().as_ref() {
                    b"entry" => {
                        if let Some(package) = entry.take().and_then(EntryFields::into_package) {
                            packages.push(package);
                        }
                    }
                    b"properties" => in_properties = false,
                    _ => {}
                }
                element = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(FeedError::InvalidResponse(
            "Feed response contains no XML elements".to_string(),
        ));
    }

    debug!("Decoded {} entries from v2 feed", packages.len());
    Ok(packages)
}

/// Parse the OData dependency string
///
/// Format: `id:versionSpec:targetFramework|...`. An entry with an empty id
/// declares a framework without dependencies. Groups keep first-seen order.
pub fn parse_dependencies(value: &str) -> Vec<FrameworkGroup> {
    let mut groups: Vec<FrameworkGroup> = Vec::new();

    for item in value.split('|').map(str::trim).filter(|s| !s.is_empty()) {
        let mut parts = item.splitn(3, ':');
        let id = parts.next().unwrap_or("").trim();
        let spec = parts.next().unwrap_or("").trim();
        let framework = parts.next().unwrap_or("").trim();

        let index = match groups.iter().position(|g| g.target_framework == framework) {
            Some(index) => index,
            None => {
                groups.push(FrameworkGroup::new(framework));
                groups.len() - 1
            }
        };

        if !id.is_empty() {
            groups[index]
                .dependencies
                .push(PackageIdentifier::new(id, spec));
        }
    }

    groups
}
