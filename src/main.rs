use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use nuget_feed::config::{self, DEFAULT_SEARCH_TAKE, FeedConfig};
use nuget_feed::feed::{
    NuGetVersion, Package, PackageIdentifier, SearchQuery, UpdateQuery, UpdateResolver,
};
use nuget_feed::logging;

#[derive(Parser)]
#[command(name = "nuget-feed")]
#[command(version, about = "Query NuGet feeds and local package directories")]
struct Cli {
    /// Configuration file [default: $XDG_CONFIG_HOME/nuget-feed/config.json]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured package sources
    Sources,
    /// Search packages on every enabled source
    Search {
        /// Search term; omit to list everything
        term: Option<String>,
        #[arg(long)]
        prerelease: bool,
        #[arg(long)]
        all_versions: bool,
        #[arg(long, default_value_t = DEFAULT_SEARCH_TAKE)]
        take: usize,
        #[arg(long, default_value_t = 0)]
        skip: usize,
    },
    /// List versions of a package, optionally inside a version range
    Find {
        id: String,
        /// Exact version or range such as "[1.0,2.0)"
        spec: Option<String>,
    },
    /// Resolve the best single match for a package
    Get { id: String, spec: String },
    /// Check installed packages for updates
    Updates {
        /// Installed packages as ID@VERSION
        #[arg(required = true)]
        packages: Vec<String>,
        #[arg(long)]
        prerelease: bool,
        #[arg(long)]
        all_versions: bool,
    },
}

fn parse_installed(value: &str) -> anyhow::Result<Package> {
    let (id, version) = value
        .split_once('@')
        .with_context(|| format!("Expected ID@VERSION, got '{}'", value))?;
    let version = NuGetVersion::parse(version)
        .with_context(|| format!("Invalid version for {}", id))?;
    Ok(Package::new(id, version))
}

fn print_packages(packages: &[Package]) {
    if packages.is_empty() {
        println!("No packages found");
        return;
    }
    for package in packages {
        let source = package.source.as_ref().map(|s| s.name()).unwrap_or("-");
        println!("{}\t{}\t[{}]", package.id, package.version, source);
    }
}

async fn run(command: Command, config: FeedConfig) -> anyhow::Result<()> {
    let resolver = UpdateResolver::from_config(&config)?;

    match command {
        Command::Sources => {
            for source in resolver.sources() {
                let state = if source.is_enabled() { "enabled" } else { "disabled" };
                println!(
                    "{}\t{}\t{}\t{}",
                    source.name(),
                    source.protocol_version(),
                    state,
                    source.config().path
                );
            }
        }
        Command::Search {
            term,
            prerelease,
            all_versions,
            take,
            skip,
        } => {
            let query = SearchQuery {
                include_prerelease: prerelease,
                include_all_versions: all_versions,
                take,
                skip,
                ..SearchQuery::new(term.unwrap_or_default())
            };
            print_packages(&resolver.search(&query).await);
        }
        Command::Find { id, spec } => {
            let identifier = PackageIdentifier::new(id, spec.unwrap_or_default());
            print_packages(&resolver.find_packages_by_id(&identifier).await);
        }
        Command::Get { id, spec } => {
            let identifier = PackageIdentifier::new(id, spec);
            let package = resolver
                .get_specific_package(&identifier)
                .await
                .with_context(|| format!("No package matches {}", identifier))?;
            print_packages(std::slice::from_ref(&package));
            if !package.download_url.is_empty() {
                println!("{}", package.download_url);
            }
        }
        Command::Updates {
            packages,
            prerelease,
            all_versions,
        } => {
            let installed = packages
                .iter()
                .map(|value| parse_installed(value))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let query = UpdateQuery {
                include_prerelease: prerelease,
                include_all_versions: all_versions,
                ..UpdateQuery::default()
            };
            print_packages(&resolver.get_updates(&installed, &query).await);
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(&config::log_path())?;

    let config_path = cli.config.unwrap_or_else(config::config_path);
    let config = FeedConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli.command, config))
}
