//! Package feed query layer
//!
//! This module talks to NuGet-compatible feeds (v2 OData, v3 JSON, local
//! directories) and works out which package versions are updates for an
//! installed set.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │UpdateResolver│────▶│PackageSource │────▶│   Fetcher    │
//! │ (aggregate)  │     │  (queries)   │     │   (HTTP)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                         │        │
//!                         ▼        ▼
//!                 ┌──────────────┐ ┌──────────────┐
//!                 │ FeedProtocol │ │LocalDirectory│
//!                 │  (v2, v3)    │ │  (.nupkg)    │
//!                 └──────────────┘ └──────────────┘
//!                         │
//!                         ▼
//!                 ┌──────────────┐
//!                 │ VersionRange │
//!                 │  (filter)    │
//!                 └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`version`]: NuGet version parsing and ordering
//! - [`range`]: Version range notation
//! - [`identifier`]: Package id + version spec pairs
//! - [`package`]: Package records returned by queries
//! - [`fetch`]: HTTP fetch trait and reqwest implementation
//! - [`protocol`]: Feed protocol trait and query parameters
//! - [`protocols`]: v2 OData and v3 JSON implementations
//! - [`nuspec`]: `.nuspec` manifest reader
//! - [`local`]: Local directory feeds
//! - [`source`]: Configured sources and their query operations
//! - [`resolver`]: Update fallback and multi-source aggregation
//! - [`error`]: Error types

pub mod error;
pub mod fetch;
pub mod identifier;
pub mod local;
pub mod nuspec;
pub mod package;
pub mod protocol;
pub mod protocols;
pub mod range;
pub mod resolver;
pub mod source;
pub mod version;

pub use identifier::PackageIdentifier;
pub use package::{FrameworkGroup, Package, SourceRef};
pub use protocol::{ProtocolVersion, SearchQuery, UpdateQuery};
pub use range::VersionRange;
pub use resolver::{UpdateResolver, get_updates_fallback};
pub use source::PackageSource;
pub use version::NuGetVersion;
