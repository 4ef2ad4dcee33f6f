//! `.nuspec` manifest reader
//!
//! Only the `<metadata>` section is read. Dependencies may be grouped per
//! target framework or listed flat directly under `<dependencies>`.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::feed::error::FeedError;
use crate::feed::identifier::PackageIdentifier;
use crate::feed::package::{FrameworkGroup, Package};
use crate::feed::version::NuGetVersion;

fn attribute(element: &BytesStart, name: &[u8]) -> Result<Option<String>, FeedError> {
    for attribute in element.attributes().flatten() {
        if attribute.key.local_name().as_ref() == name {
            let value = attribute
                .unescape_value()
                .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[derive(Default)]
struct Metadata {
    id: String,
    version: String,
    title: String,
    description: String,
    summary: String,
    authors: String,
    license_url: String,
    icon_url: String,
    dependencies: Vec<FrameworkGroup>,
}

impl Metadata {
    fn set(&mut self, element: &[u8], text: &str) {
        let field = match element {
            b"id" => &mut self.id,
            b"version" => &mut self.version,
            b"title" => &mut self.title,
            b"description" => &mut self.description,
            b"summary" => &mut self.summary,
            b"authors" => &mut self.authors,
            b"licenseUrl" => &mut self.license_url,
            b"iconUrl" => &mut self.icon_url,
            _ => return,
        };
        field.push_str(text);
    }

    fn add_dependency(&mut self, in_group: bool, dependency: PackageIdentifier) {
        if !in_group && self.dependencies.is_empty() {
            self.dependencies.push(FrameworkGroup::default());
        }
        if let Some(group) = self.dependencies.last_mut() {
            group.dependencies.push(dependency);
        }
    }
}

fn dependency(element: &BytesStart) -> Result<Option<PackageIdentifier>, FeedError> {
    let Some(id) = attribute(element, b"id")?.filter(|id| !id.is_empty()) else {
        return Ok(None);
    };
    let version = attribute(element, b"version")?.unwrap_or_default();
    Ok(Some(PackageIdentifier::new(id, version)))
}

/// Parse a `.nuspec` document into a package record
pub fn parse_nuspec(content: &[u8]) -> Result<Package, FeedError> {
    let text = std::str::from_utf8(content)
        .map_err(|e| FeedError::InvalidResponse(format!("nuspec is not UTF-8: {}", e)))?;
    // Strip a byte-order mark written by some packers
    let text = text.trim_start_matches('\u{feff}');

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut metadata = Metadata::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut in_group = false;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = start.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"group" if path.last().is_some_and(|p| p == b"dependencies") => {
                        let framework = attribute(&start, b"targetFramework")?.unwrap_or_default();
                        metadata.dependencies.push(FrameworkGroup::new(framework));
                        in_group = true;
                    }
                    b"dependency" => {
                        if let Some(dependency) = dependency(&start)? {
                            metadata.add_dependency(in_group, dependency);
                        }
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::Empty(empty) => match empty.local_name().as_ref() {
                b"group" if path.last().is_some_and(|p| p == b"dependencies") => {
                    let framework = attribute(&empty, b"targetFramework")?.unwrap_or_default();
                    metadata.dependencies.push(FrameworkGroup::new(framework));
                }
                b"dependency" => {
                    if let Some(dependency) = dependency(&empty)? {
                        metadata.add_dependency(in_group, dependency);
                    }
                }
                _ => {}
            },
            Event::End(end) => {
                if end.local_name().as_ref() == b"group" {
                    in_group = false;
                }
                path.pop();
            }
            Event::Text(text) => {
                // Only direct children of <metadata> carry package fields
                if path.len() >= 2 && path[path.len() - 2] == b"metadata" {
                    let value = text
                        .unescape()
                        .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;
                    if let Some(element) = path.last() {
                        metadata.set(element, &value);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if metadata.id.is_empty() {
        return Err(FeedError::InvalidResponse("nuspec has no <id>".to_string()));
    }
    let version = NuGetVersion::parse(&metadata.version).map_err(|e| {
        FeedError::InvalidResponse(format!("nuspec for {} has {}", metadata.id, e))
    })?;
    debug!("Read nuspec for {} {}", metadata.id, version);

    let mut package = Package::new(metadata.id, version);
    package.title = metadata.title;
    package.description = metadata.description;
    package.summary = metadata.summary;
    package.authors = metadata.authors;
    package.license_url = metadata.license_url;
    package.icon_url = metadata.icon_url;
    package.dependencies = metadata.dependencies;
    Ok(package)
}
