//! Dependency resolver (C5): depth-first, memoised resolution of a
//! dependency tree from a set of top-level ranges, with peer-dependency
//! support and cycle detection. Implements spec §4.5's algorithm directly
//! rather than the teacher's `sat_resolver`/PubGrub exact solver — the spec
//! calls for a DFS with an in-progress set, ancestor walk, and iteration
//! cap, not constraint satisfaction, so that's what's built here. The BFS
//! conflict-tracking style of the teacher's `lockfile_write::resolve_full_tree`
//! informed how per-dependency failures are collected as warnings instead of
//! aborting the whole resolution.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use crate::error::{PmError, Warning};
use crate::registry::{PackageMetadata, VersionInfo};
use crate::semver::{self, Range};

const DEFAULT_MAX_DEPTH: u32 = 50;
const MAX_ITERATIONS: u32 = 10_000;

/// A resolved `(name, version)` with its tarball location, integrity, and
/// declared dependency ranges. Identity is `(name, version)`.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub tarball_url: String,
    pub integrity: String,
    pub dependencies: HashMap<String, String>,
    pub peer_dependencies: HashMap<String, String>,
}

/// A node in the resolved dependency tree. The root node exclusively owns
/// the tree; children are kept in an order-preserving `Vec` (each already
/// carries its own name, so a separate name→node map would just duplicate
/// that key) and hold a `Weak` back-reference to their parent for the
/// ancestor-cycle walk.
pub struct DependencyNode {
    pub name: String,
    pub version: String,
    pub resolved: ResolvedPackage,
    pub parent: Option<Weak<RefCell<DependencyNode>>>,
    pub depth: u32,
    pub children: Vec<Rc<RefCell<DependencyNode>>>,
}

/// Source of package metadata for the resolver. A trait so tests can supply
/// an in-memory registry instead of a live `RegistryClient`.
pub trait MetadataSource {
    fn get_package_metadata(&self, name: &str) -> Result<PackageMetadata, PmError>;
}

impl MetadataSource for crate::registry::RegistryClient {
    fn get_package_metadata(&self, name: &str) -> Result<PackageMetadata, PmError> {
        crate::registry::RegistryClient::get_package_metadata(self, name)
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub peer: bool,
    pub max_depth: u32,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { peer: true, max_depth: DEFAULT_MAX_DEPTH }
    }
}

/// The result of a top-level `resolve` call: the tree (one root child per
/// requested top-level range), a flattened-later set is produced
/// separately by the hoister, and any non-fatal per-dependency warnings.
pub struct ResolveOutcome {
    pub roots: Vec<Rc<RefCell<DependencyNode>>>,
    pub warnings: Vec<Warning>,
}

struct ResolveState<'a, M: MetadataSource> {
    source: &'a M,
    in_progress: HashSet<String>,
    memo: HashMap<(String, String), ResolvedPackage>,
    iteration_count: u32,
    warnings: Vec<Warning>,
    options: ResolveOptions,
}

fn version_of(metadata: &PackageMetadata, info: &VersionInfo) -> String {
    let _ = metadata;
    info.version.clone()
}

fn resolved_from_info(name: &str, info: &VersionInfo) -> ResolvedPackage {
    ResolvedPackage {
        name: name.to_string(),
        version: info.version.clone(),
        tarball_url: info.dist.tarball.clone(),
        integrity: info.dist.integrity.clone().unwrap_or_default(),
        dependencies: info.dependencies.clone(),
        peer_dependencies: info.peer_dependencies.clone(),
    }
}

fn ancestor_has_name(parent: &Option<Rc<RefCell<DependencyNode>>>, name: &str) -> bool {
    let mut current = parent.clone();
    while let Some(node) = current {
        let node_ref = node.borrow();
        if node_ref.name == name {
            return true;
        }
        current = node_ref.parent.as_ref().and_then(|w| w.upgrade());
    }
    false
}

fn ancestor_satisfying(parent: &Option<Rc<RefCell<DependencyNode>>>, name: &str, range: &Range) -> bool {
    let mut current = parent.clone();
    while let Some(node) = current {
        let node_ref = node.borrow();
        if node_ref.name == name {
            if let Ok(v) = semver::parse_version(&node_ref.version) {
                return semver::satisfies(&v, range);
            }
            return false;
        }
        current = node_ref.parent.as_ref().and_then(|w| w.upgrade());
    }
    false
}

impl<'a, M: MetadataSource> ResolveState<'a, M> {
    fn resolve_package(
        &mut self,
        name: &str,
        range_str: &str,
        depth: u32,
        parent: Option<Rc<RefCell<DependencyNode>>>,
    ) -> Result<Option<Rc<RefCell<DependencyNode>>>, PmError> {
        self.iteration_count += 1;
        if self.iteration_count > MAX_ITERATIONS {
            return Err(PmError::ResolutionLimit {
                message: format!("exceeded {} resolution iterations", MAX_ITERATIONS),
            });
        }

        if depth > self.options.max_depth {
            self.warnings.push(Warning::new(name, format!("max depth {} exceeded", self.options.max_depth)));
            return Ok(None);
        }

        if self.in_progress.contains(name) {
            return Ok(None);
        }
        if ancestor_has_name(&parent, name) {
            return Ok(None);
        }

        self.in_progress.insert(name.to_string());
        let outcome = self.resolve_work(name, range_str, depth, parent);
        self.in_progress.remove(name);
        outcome
    }

    fn resolve_work(
        &mut self,
        name: &str,
        range_str: &str,
        depth: u32,
        parent: Option<Rc<RefCell<DependencyNode>>>,
    ) -> Result<Option<Rc<RefCell<DependencyNode>>>, PmError> {
        let metadata = match self.source.get_package_metadata(name) {
            Ok(m) => m,
            Err(e) => {
                self.warnings.push(Warning::new(name, e.to_string()));
                return Ok(None);
            }
        };

        let info = match resolve_version_info(&metadata, range_str) {
            Ok(info) => info,
            Err(e) => {
                self.warnings.push(Warning::new(name, e.to_string()));
                return Ok(None);
            }
        };

        let version = version_of(&metadata, info);
        let memo_key = (name.to_string(), version.clone());
        let resolved = match self.memo.get(&memo_key) {
            Some(r) => r.clone(),
            None => {
                let r = resolved_from_info(name, info);
                self.memo.insert(memo_key, r.clone());
                r
            }
        };

        let node = Rc::new(RefCell::new(DependencyNode {
            name: name.to_string(),
            version: version.clone(),
            resolved: resolved.clone(),
            parent: parent.as_ref().map(Rc::downgrade),
            depth,
            children: Vec::new(),
        }));

        let mut dep_names: Vec<&String> = resolved.dependencies.keys().collect();
        dep_names.sort();
        for dep_name in dep_names {
            let dep_range = &resolved.dependencies[dep_name];
            if let Ok(Some(child)) = self.resolve_package(dep_name, dep_range, depth + 1, Some(node.clone())) {
                node.borrow_mut().children.push(child);
            }
        }

        if self.options.peer {
            let mut peer_names: Vec<&String> = resolved.peer_dependencies.keys().collect();
            peer_names.sort();
            for dep_name in peer_names {
                let dep_range = &resolved.peer_dependencies[dep_name];
                let range = match semver::parse_range(dep_range) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if ancestor_satisfying(&Some(node.clone()), dep_name, &range) {
                    continue;
                }
                if let Ok(Some(child)) = self.resolve_package(dep_name, dep_range, depth + 1, Some(node.clone())) {
                    node.borrow_mut().children.push(child);
                }
            }
        }

        Ok(Some(node))
    }
}

fn resolve_version_info<'a>(metadata: &'a PackageMetadata, range_str: &str) -> Result<&'a VersionInfo, PmError> {
    if let Some(v) = metadata.dist_tags.get(range_str) {
        return metadata.versions.get(v).ok_or_else(|| PmError::VersionNotFound {
            package: metadata.name.clone(),
            range: range_str.to_string(),
        });
    }

    let range = semver::parse_range(range_str).map_err(|_| PmError::VersionNotFound {
        package: metadata.name.clone(),
        range: range_str.to_string(),
    })?;
    if let Range::Tag(tag) = &range {
        if let Some(v) = metadata.dist_tags.get(tag) {
            return metadata.versions.get(v).ok_or_else(|| PmError::VersionNotFound {
                package: metadata.name.clone(),
                range: range_str.to_string(),
            });
        }
        return Err(PmError::VersionNotFound { package: metadata.name.clone(), range: range_str.to_string() });
    }

    let mut parsed = Vec::new();
    for key in metadata.versions.keys() {
        if let Ok(v) = semver::parse_version(key) {
            parsed.push((v, key.clone()));
        }
    }
    let versions: Vec<_> = parsed.iter().map(|(v, _)| v.clone()).collect();
    let best = semver::max_satisfying(&versions, &range).ok_or_else(|| PmError::VersionNotFound {
        package: metadata.name.clone(),
        range: range_str.to_string(),
    })?;
    let key = parsed.iter().find(|(v, _)| v == best).map(|(_, k)| k.clone()).unwrap();
    metadata.versions.get(&key).ok_or_else(|| PmError::VersionNotFound {
        package: metadata.name.clone(),
        range: range_str.to_string(),
    })
}

/// Resolves `top_level` (name→range) into a dependency tree, recursing
/// through `dependencies` (and `peerDependencies` when `options.peer`),
/// detecting cycles via an in-progress set plus an ancestor walk, and
/// bailing out fatally once `MAX_ITERATIONS` is exceeded.
pub fn resolve<M: MetadataSource>(
    top_level: &HashMap<String, String>,
    options: ResolveOptions,
    source: &M,
) -> Result<ResolveOutcome, PmError> {
    let mut state = ResolveState {
        source,
        in_progress: HashSet::new(),
        memo: HashMap::new(),
        iteration_count: 0,
        warnings: Vec::new(),
        options,
    };

    let mut roots = Vec::new();
    let mut names: Vec<&String> = top_level.keys().collect();
    names.sort();
    for name in names {
        let range = &top_level[name];
        match state.resolve_package(name, range, 1, None) {
            Ok(Some(node)) => roots.push(node),
            Ok(None) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(ResolveOutcome { roots, warnings: state.warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    struct FakeRegistry {
        packages: Map<String, PackageMetadata>,
    }

    impl MetadataSource for FakeRegistry {
        fn get_package_metadata(&self, name: &str) -> Result<PackageMetadata, PmError> {
            self.packages.get(name).cloned().ok_or_else(|| PmError::PackageNotFound { package: name.to_string() })
        }
    }

    fn version_info(version: &str, deps: &[(&str, &str)]) -> VersionInfo {
        VersionInfo {
            version: version.to_string(),
            dist: crate::registry::Dist {
                tarball: format!("https://registry.example/pkg-{}.tgz", version),
                integrity: Some("sha256-x".to_string()),
                shasum: None,
            },
            dependencies: deps.iter().map(|(n, r)| (n.to_string(), r.to_string())).collect(),
            peer_dependencies: Map::new(),
            bin: None,
        }
    }

    fn metadata(name: &str, versions: &[(&str, &[(&str, &str)])]) -> PackageMetadata {
        let mut vmap = Map::new();
        for (v, deps) in versions {
            vmap.insert(v.to_string(), version_info(v, deps));
        }
        let mut dist_tags = Map::new();
        if let Some((last, _)) = versions.last() {
            dist_tags.insert("latest".to_string(), last.to_string());
        }
        PackageMetadata { name: name.to_string(), dist_tags, versions: vmap }
    }

    #[test]
    fn resolves_simple_tree() {
        let mut packages = Map::new();
        packages.insert("a".to_string(), metadata("a", &[("1.0.0", &[("b", "^1.0.0")])]));
        packages.insert("b".to_string(), metadata("b", &[("1.0.0", &[])]));
        let registry = FakeRegistry { packages };

        let mut top = Map::new();
        top.insert("a".to_string(), "^1.0.0".to_string());
        let outcome = resolve(&top, ResolveOptions::default(), &registry).unwrap();

        assert_eq!(outcome.roots.len(), 1);
        let root = outcome.roots[0].borrow();
        assert_eq!(root.version, "1.0.0");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].borrow().name, "b");
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn direct_cycle_a_to_b_to_a_is_broken() {
        let mut packages = Map::new();
        packages.insert("a".to_string(), metadata("a", &[("1.0.0", &[("b", "^1.0.0")])]));
        packages.insert("b".to_string(), metadata("b", &[("1.0.0", &[("a", "^1.0.0")])]));
        let registry = FakeRegistry { packages };

        let mut top = Map::new();
        top.insert("a".to_string(), "^1.0.0".to_string());
        let outcome = resolve(&top, ResolveOptions::default(), &registry).unwrap();

        let root = outcome.roots[0].borrow();
        assert_eq!(root.name, "a");
        let b = root.children[0].borrow();
        assert_eq!(b.name, "b");
        // b's attempted dependency on a is suppressed by the ancestor walk.
        assert!(b.children.is_empty());
    }

    #[test]
    fn three_hop_cycle_a_b_c_a_is_broken() {
        let mut packages = Map::new();
        packages.insert("a".to_string(), metadata("a", &[("1.0.0", &[("b", "^1.0.0")])]));
        packages.insert("b".to_string(), metadata("b", &[("1.0.0", &[("c", "^1.0.0")])]));
        packages.insert("c".to_string(), metadata("c", &[("1.0.0", &[("a", "^1.0.0")])]));
        let registry = FakeRegistry { packages };

        let mut top = Map::new();
        top.insert("a".to_string(), "^1.0.0".to_string());
        let outcome = resolve(&top, ResolveOptions::default(), &registry).unwrap();

        let root = outcome.roots[0].borrow();
        let b = root.children[0].borrow();
        let c = b.children[0].borrow();
        assert!(c.children.is_empty());
    }

    #[test]
    fn diamond_dependency_resolves_both_branches() {
        let mut packages = Map::new();
        packages.insert(
            "a".to_string(),
            metadata("a", &[("1.0.0", &[("b", "^1.0.0"), ("c", "^1.0.0")])]),
        );
        packages.insert("b".to_string(), metadata("b", &[("1.0.0", &[("d", "^1.0.0")])]));
        packages.insert("c".to_string(), metadata("c", &[("1.0.0", &[("d", "^1.0.0")])]));
        packages.insert("d".to_string(), metadata("d", &[("1.0.0", &[])]));
        let registry = FakeRegistry { packages };

        let mut top = Map::new();
        top.insert("a".to_string(), "^1.0.0".to_string());
        let outcome = resolve(&top, ResolveOptions::default(), &registry).unwrap();

        let root = outcome.roots[0].borrow();
        assert_eq!(root.children.len(), 2);
        for child in &root.children {
            assert_eq!(child.borrow().children[0].borrow().name, "d");
        }
    }

    #[test]
    fn missing_dependency_is_a_warning_not_fatal() {
        let mut packages = Map::new();
        packages.insert("a".to_string(), metadata("a", &[("1.0.0", &[("missing", "^1.0.0")])]));
        let registry = FakeRegistry { packages };

        let mut top = Map::new();
        top.insert("a".to_string(), "^1.0.0".to_string());
        let outcome = resolve(&top, ResolveOptions::default(), &registry).unwrap();

        assert_eq!(outcome.roots.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].package.as_deref(), Some("missing"));
    }

    #[test]
    fn tag_resolution_picks_dist_tag_version() {
        let mut packages = Map::new();
        packages.insert("a".to_string(), metadata("a", &[("1.0.0", &[]), ("2.0.0", &[])]));
        let registry = FakeRegistry { packages };

        let mut top = Map::new();
        top.insert("a".to_string(), "latest".to_string());
        let outcome = resolve(&top, ResolveOptions::default(), &registry).unwrap();
        assert_eq!(outcome.roots[0].borrow().version, "2.0.0");
    }
}
