//! Remote feed fixtures for mockito servers

use std::time::Duration;

use nuget_feed::config::SourceConfig;
use nuget_feed::feed::{PackageSource, ProtocolVersion};

/// Atom feed with one OData entry per `(id, version)`
pub fn atom_feed(entries: &[(&str, &str)]) -> String {
    let entries: String = entries
        .iter()
        .map(|(id, version)| {
            format!(
                r#"
  <entry>
    <id>https://feed.example.com/api/v2/Packages(Id='{id}',Version='{version}')</id>
    <title type="text">{id}</title>
    <content type="application/zip" src="https://feed.example.com/api/v2/package/{id}/{version}" />
    <m:properties>
      <d:Id>{id}</d:Id>
      <d:Version>{version}</d:Version>
      <d:DownloadCount m:type="Edm.Int32">10</d:DownloadCount>
    </m:properties>
  </entry>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<feed xml:base="https://feed.example.com/api/v2" xmlns="http://www.w3.org/2005/Atom"
      xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
      xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
  <title type="text">Packages</title>{}
</feed>"#,
        entries
    )
}

/// HTTP-backed source pointing at `{server_url}{path}`
pub fn remote_source(
    server_url: &str,
    path: &str,
    protocol_version: ProtocolVersion,
) -> PackageSource {
    let config = SourceConfig::new("remote", format!("{}{}", server_url, path), protocol_version);
    PackageSource::new(config, Duration::from_secs(5)).unwrap()
}
