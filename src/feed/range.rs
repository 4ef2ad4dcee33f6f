//! NuGet version range notation
//!
//! Supports interval specifications:
//! - `1.0` - exactly 1.0 (same as `[1.0]` and `[1.0,1.0]`)
//! - `(1.0,)` - greater than 1.0
//! - `[1.0,)` - 1.0 or greater
//! - `(,1.0]`, `(,1.0)` - upper bound only
//! - `[1.0,2.0]`, `(1.0,2.0)`, `[1.0,2.0)`, `(1.0,2.0]` - bounded intervals

use std::fmt;
use std::str::FromStr;

use crate::feed::error::VersionParseError;
use crate::feed::version::NuGetVersion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Option<NuGetVersion>,
    pub min_inclusive: bool,
    pub max: Option<NuGetVersion>,
    pub max_inclusive: bool,
}

impl VersionRange {
    /// Range matching exactly one version
    pub fn exact(version: NuGetVersion) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
        }
    }

    /// Range matching every version strictly greater than `version`
    pub fn greater_than(version: NuGetVersion) -> Self {
        Self {
            min: Some(version),
            min_inclusive: false,
            max: None,
            max_inclusive: false,
        }
    }

    /// Range matching `version` and everything above it
    pub fn at_least(version: NuGetVersion) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    pub fn parse(spec: &str) -> Result<Self, VersionParseError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let invalid = || VersionParseError::InvalidRange(spec.to_string());

        let first = spec.chars().next().ok_or_else(invalid)?;
        let last = spec.chars().next_back().ok_or_else(invalid)?;
        let opens = matches!(first, '[' | '(');
        let closes = matches!(last, ']' | ')');

        if !opens && !closes {
            let version = NuGetVersion::parse(spec).map_err(|_| invalid())?;
            return Ok(Self::exact(version));
        }

        if !(opens && closes) || spec.len() < 2 {
            return Err(invalid());
        }

        let min_inclusive = first == '[';
        let max_inclusive = last == ']';
        let inner = &spec[1..spec.len() - 1];

        if inner.contains(['[', ']', '(', ')']) {
            return Err(invalid());
        }

        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();

        let range = match parts.as_slice() {
            // [1.0] is the only single-part form
            [single] => {
                if !(min_inclusive && max_inclusive) {
                    return Err(invalid());
                }
                let version = NuGetVersion::parse(single).map_err(|_| invalid())?;
                Self::exact(version)
            }
            [min, max] => {
                let min = Self::parse_bound(min).map_err(|_| invalid())?;
                let max = Self::parse_bound(max).map_err(|_| invalid())?;
                if min.is_none() && max.is_none() {
                    return Err(invalid());
                }
                Self {
                    min,
                    min_inclusive,
                    max,
                    max_inclusive,
                }
            }
            _ => return Err(invalid()),
        };

        if let (Some(min), Some(max)) = (&range.min, &range.max) {
            if min > max {
                return Err(invalid());
            }
            if min == max && !(range.min_inclusive && range.max_inclusive) {
                return Err(invalid());
            }
        }

        Ok(range)
    }

    fn parse_bound(part: &str) -> Result<Option<NuGetVersion>, VersionParseError> {
        if part.is_empty() {
            Ok(None)
        } else {
            NuGetVersion::parse(part).map(Some)
        }
    }

    pub fn contains(&self, version: &NuGetVersion) -> bool {
        if let Some(min) = &self.min {
            let above = if self.min_inclusive {
                version >= min
            } else {
                version > min
            };
            if !above {
                return false;
            }
        }

        if let Some(max) = &self.max {
            let below = if self.max_inclusive {
                version <= max
            } else {
                version < max
            };
            if !below {
                return false;
            }
        }

        true
    }

    /// Whether the range pins exactly one version
    pub fn is_exact(&self) -> bool {
        self.min_inclusive && self.max_inclusive && self.min.is_some() && self.min == self.max
    }
}

impl FromStr for VersionRange {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact()
            && let Some(version) = &self.min
        {
            return write!(f, "[{}]", version);
        }

        f.write_str(if self.min_inclusive { "[" } else { "(" })?;
        if let Some(min) = &self.min {
            write!(f, "{}", min)?;
        }
        f.write_str(", ")?;
        if let Some(max) = &self.max {
            write!(f, "{}", max)?;
        }
        f.write_str(if self.max_inclusive { "]" } else { ")" })
    }
}
