//! Hoister (C6): flattens a resolved dependency tree into `node_modules/...`
//! paths with npm-style first-seen-wins hoisting (spec §4.6).
//!
//! The resolver produces a DAG through shared `ResolvedPackage` values; this
//! module produces the flat map without ever materialising a second copy of
//! the tree — it walks the `DependencyNode` tree the resolver already built
//! and threads a single `name -> hoisted version` map through the DFS, per
//! spec §9's tree/flat duality note.

use std::collections::HashMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::resolver::{DependencyNode, ResolvedPackage};

/// One entry in the flattened, hoisted layout: a `node_modules/...` path and
/// the package placed there.
#[derive(Debug, Clone)]
pub struct FlatDependency {
    pub name: String,
    pub version: String,
    pub resolved: ResolvedPackage,
    pub integrity: String,
    pub path: String,
}

/// Flattens `roots` (one per top-level requested range) into a path->entry
/// map. Placement follows first-seen-wins: a name's first occurrence in DFS
/// preorder is hoisted to `node_modules/<name>`; later occurrences at the
/// same version are skipped (satisfied by ancestor lookup); occurrences at a
/// different version are nested under their parent's own path instead.
///
/// Deterministic given a stable child order inside each `DependencyNode` —
/// the resolver already threads dependency ranges through in sorted-name
/// order, so two calls over the same tree produce byte-identical output.
pub fn hoist(roots: &[Rc<RefCell<DependencyNode>>]) -> HashMap<String, FlatDependency> {
    let mut hoisted_version: HashMap<String, String> = HashMap::new();
    let mut flat: HashMap<String, FlatDependency> = HashMap::new();

    for root in roots {
        place_and_descend(root, "", &mut hoisted_version, &mut flat);
    }

    flat
}

fn place_and_descend(
    node: &Rc<RefCell<DependencyNode>>,
    parent_path: &str,
    hoisted_version: &mut HashMap<String, String>,
    flat: &mut HashMap<String, FlatDependency>,
) {
    let node_ref = node.borrow();

    match hoisted_version.get(&node_ref.name) {
        None => {
            let path = format!("node_modules/{}", node_ref.name);
            hoisted_version.insert(node_ref.name.clone(), node_ref.version.clone());
            flat.insert(
                path.clone(),
                FlatDependency {
                    name: node_ref.name.clone(),
                    version: node_ref.version.clone(),
                    resolved: node_ref.resolved.clone(),
                    integrity: node_ref.resolved.integrity.clone(),
                    path: path.clone(),
                },
            );
            for child in &node_ref.children {
                place_and_descend(child, &path, hoisted_version, flat);
            }
        }
        Some(hoisted) if *hoisted == node_ref.version => {
            // Already hoisted at this exact version; the consumer resolves
            // it via ancestor lookup and its subtree was already placed.
        }
        Some(_) => {
            let path = format!("{}/node_modules/{}", parent_path, node_ref.name);
            flat.insert(
                path.clone(),
                FlatDependency {
                    name: node_ref.name.clone(),
                    version: node_ref.version.clone(),
                    resolved: node_ref.resolved.clone(),
                    integrity: node_ref.resolved.integrity.clone(),
                    path: path.clone(),
                },
            );
            for child in &node_ref.children {
                place_and_descend(child, &path, hoisted_version, flat);
            }
        }
    }
}
