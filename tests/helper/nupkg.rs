//! Local package archive fixtures

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use nuget_feed::config::SourceConfig;
use nuget_feed::feed::fetch::HttpFetcher;
use nuget_feed::feed::{PackageSource, ProtocolVersion};

/// Write `{dir}/{id}.{version}.nupkg` containing a minimal nuspec
pub fn write_nupkg(dir: &Path, id: &str, version: &str) -> PathBuf {
    write_nupkg_with(dir, id, version, "")
}

/// Like [`write_nupkg`], with extra XML placed inside `<metadata>`
pub fn write_nupkg_with(dir: &Path, id: &str, version: &str, metadata: &str) -> PathBuf {
    let path = dir.join(format!("{}.{}.nupkg", id, version));
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);

    zip.start_file(format!("{}.nuspec", id), options).unwrap();
    write!(
        zip,
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{}</id>
    <version>{}</version>
    <authors>fixture</authors>
    <description>{} fixture</description>
    {}
  </metadata>
</package>"#,
        id, version, id, metadata
    )
    .unwrap();

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<Types/>").unwrap();
    zip.finish().unwrap();
    path
}

/// Temporary directory pre-filled with `(id, version)` archives
pub fn create_package_dir(packages: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (id, version) in packages {
        write_nupkg(temp_dir.path(), id, version);
    }
    temp_dir
}

/// Local source over `dir`; the HTTP client is never used
pub fn local_source(name: &str, dir: &Path) -> PackageSource {
    let config = SourceConfig::new(name, dir.display().to_string(), ProtocolVersion::V2);
    let fetcher = HttpFetcher::new(Default::default()).unwrap();
    PackageSource::with_fetcher(config, Arc::new(fetcher))
}
