//! Core library for vpm: an in-browser, npm-compatible package manager.
//!
//! The crate is organised around the eight components of the PM core: a
//! SemVer engine, a registry client, a tar+gzip extractor, a two-tier
//! package cache, a dependency resolver, a hoister, a lockfile codec, and
//! an orchestrator that drives `install`/`uninstall`/`list` against a
//! pluggable filesystem capability. Everything here is synchronous and
//! single-threaded from the caller's point of view, matching the spec's
//! cooperative-scheduling model; a WASM host embeds it by implementing
//! `fs::FileSystem` and `cache::PersistentStore` against OPFS and driving
//! one `install` at a time, per the concurrency discipline in the spec.

pub mod bin_links;
pub mod cache;
pub mod cas;
pub mod config;
pub mod error;
pub mod extract;
pub mod fs;
pub mod hoist;
pub mod lockfile;
pub mod log;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod run;
pub mod semver;
pub mod transport;

pub use bin_links::{link_bins_for_package, rebuild_bin_links, BinLinkReport};
pub use cache::{CacheStats, PackageCache, PersistentStore};
pub use config::Config;
pub use error::{PmError, Warning};
pub use extract::{extract, ExtractedPackage};
pub use fs::{FileSystem, NativeFileSystem};
pub use hoist::{hoist, FlatDependency};
pub use lockfile::{generate_lockfile, merge_lockfiles, parse_lockfile, Lockfile, LockfileEntry};
pub use orchestrator::{
    InstallOptions, InstallResult, ListedPackage, Orchestrator, Phase, ProgressEvent,
};
pub use registry::{PackageMetadata, RegistryClient, VersionInfo};
pub use resolver::{resolve, DependencyNode, ResolveOptions, ResolveOutcome, ResolvedPackage};
pub use semver::{
    compare, max_satisfying, min_satisfying, parse_range, parse_version, satisfies,
    sort_versions, Range, Version,
};
