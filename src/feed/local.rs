//! Local directory feeds
//!
//! A local source is a directory of `.nupkg` archives, either flat
//! (`Foo.1.0.0.nupkg`) or in the hierarchical `foo/1.0.0/foo.1.0.0.nupkg`
//! layout. Package metadata comes from the `.nuspec` inside each archive.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::feed::error::FeedError;
use crate::feed::nuspec::parse_nuspec;
use crate::feed::package::Package;
use crate::feed::version::NuGetVersion;

/// Deep enough for `id/version/file.nupkg`
const MAX_SCAN_DEPTH: usize = 3;

const ARCHIVE_EXTENSION: &str = ".nupkg";
const SYMBOLS_EXTENSION: &str = ".symbols.nupkg";

pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_exists(&self) -> Result<(), FeedError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(FeedError::NotConfigured(self.root.clone()))
        }
    }

    /// Read every archive in the directory, optionally only those named after `id`
    ///
    /// Archives that cannot be read are logged and skipped. The returned
    /// packages are not filtered by id; file names are only a prefilter.
    pub fn packages(&self, id: Option<&str>) -> Result<Vec<Package>, FeedError> {
        self.ensure_exists()?;

        let name_filter = id
            .map(|id| Regex::new(&format!(r"(?i)^{}\.\d", regex::escape(id))))
            .transpose()
            .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;

        let packages: Vec<Package> = WalkDir::new(&self.root)
            .max_depth(MAX_SCAN_DEPTH)
            .follow_links(true)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| is_package_archive(entry.path()))
            .filter(|entry| {
                name_filter.as_ref().is_none_or(|filter| {
                    filter.is_match(&entry.file_name().to_string_lossy())
                })
            })
            .filter_map(|entry| {
                read_package(entry.path())
                    .inspect_err(|e| warn!("Skipping {}: {}", entry.path().display(), e))
                    .ok()
            })
            .collect();

        debug!(
            "Found {} local packages in {}",
            packages.len(),
            self.root.display()
        );
        Ok(packages)
    }

    /// Look up the archive of one exact package version
    ///
    /// Tries the conventional file names first and only scans the directory
    /// when none of them exist (e.g. `Foo.1.0.nupkg` for version `1.0.0`).
    pub fn find_exact(
        &self,
        id: &str,
        version: &NuGetVersion,
    ) -> Result<Option<Package>, FeedError> {
        self.ensure_exists()?;

        let file_name = format!("{}.{}{}", id, version, ARCHIVE_EXTENSION);
        let candidates = [
            self.root.join(&file_name),
            self.root
                .join(id.to_lowercase())
                .join(version.to_string().to_lowercase())
                .join(file_name.to_lowercase()),
        ];

        for candidate in candidates.iter().filter(|path| path.is_file()) {
            match read_package(candidate) {
                Ok(package) if package.id == id && &package.version == version => {
                    return Ok(Some(package));
                }
                Ok(package) => debug!(
                    "{} contains {}, expected {} {}",
                    candidate.display(),
                    package,
                    id,
                    version
                ),
                Err(e) => warn!("Skipping {}: {}", candidate.display(), e),
            }
        }

        Ok(self
            .packages(Some(id))?
            .into_iter()
            .find(|package| package.id == id && &package.version == version))
    }
}

fn is_package_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(ARCHIVE_EXTENSION) && !name.ends_with(SYMBOLS_EXTENSION)
}

/// Read the package record of a `.nupkg` archive
///
/// The archive path becomes the package's download URL.
pub fn read_package(path: &Path) -> Result<Package, FeedError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let nuspec_index = (0..archive.len())
        .find(|&index| {
            archive.name_for_index(index).is_some_and(|name| {
                !name.contains('/') && name.to_lowercase().ends_with(".nuspec")
            })
        })
        .ok_or_else(|| FeedError::Archive(format!("{} has no .nuspec", path.display())))?;

    let mut content = Vec::new();
    archive.by_index(nuspec_index)?.read_to_end(&mut content)?;

    let mut package = parse_nuspec(&content)?;
    package.download_url = path.display().to_string();
    Ok(package)
}
