//! NuGet package versions
//!
//! NuGet versions are semver-like but allow a fourth numeric part and
//! omitted trailing parts:
//! - `1` -> 1.0.0
//! - `1.2` -> 1.2.0
//! - `1.2.3.4` -> 1.2.3.4
//! - `1.2.3-beta.1+sha.abc` -> 1.2.3-beta.1 (metadata ignored for ordering)

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::feed::error::VersionParseError;

#[derive(Debug, Clone)]
pub struct NuGetVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    release: Option<String>,
    original: String,
}

impl NuGetVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            release: None,
            original: format!("{}.{}.{}", major, minor, patch),
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let invalid = || VersionParseError::InvalidVersion(input.to_string());

        // Build metadata never takes part in comparisons
        let without_metadata = match trimmed.split_once('+') {
            Some((head, metadata)) if !metadata.is_empty() => head,
            Some(_) => return Err(invalid()),
            None => trimmed,
        };

        let (numbers, release) = match without_metadata.split_once('-') {
            Some((numbers, label)) => {
                let valid_label = !label.is_empty()
                    && label.split('.').all(|segment| {
                        !segment.is_empty()
                            && segment
                                .chars()
                                .all(|c| c.is_ascii_alphanumeric() || c == '-')
                    });
                if !valid_label {
                    return Err(invalid());
                }
                (numbers, Some(label.to_string()))
            }
            None => (without_metadata, None),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(invalid());
        }

        let mut values = [0u64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }

        Ok(Self {
            major: values[0],
            minor: values[1],
            patch: values[2],
            revision: values[3],
            release,
            original: trimmed.to_string(),
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Pre-release label without the leading `-`
    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        self.release.is_some()
    }

    /// The string this version was parsed from
    pub fn original(&self) -> &str {
        &self.original
    }

    fn numbers(&self) -> [u64; 4] {
        [self.major, self.minor, self.patch, self.revision]
    }
}

/// Compare two pre-release labels segment by segment
///
/// Numeric segments compare numerically and sort before alphanumeric ones;
/// alphanumeric segments compare case-insensitively.
fn compare_release_labels(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(ln), Ok(rn)) => ln.cmp(&rn),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => l.to_ascii_lowercase().cmp(&r.to_ascii_lowercase()),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

impl Ord for NuGetVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numbers()
            .cmp(&other.numbers())
            .then_with(|| match (&self.release, &other.release) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_release_labels(a, b),
            })
    }
}

impl PartialOrd for NuGetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NuGetVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NuGetVersion {}

impl FromStr for NuGetVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        if let Some(release) = &self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Default for NuGetVersion {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}
