// src/scheduler/cycle.rs

//! Dependency cycle breaking
//!
//! Packages that depend on each other while all waiting for configuration
//! would defer forever. From the second try on, before checking a package
//! we look for a cycle of not-yet-configured packages that leads back to
//! it and force the first edge of that cycle satisfied. The package in hand
//! can then be configured and the rest of the cycle follows.

use super::RunContext;
use crate::pkg::{PackageStore, PkgId, Status};
use std::collections::HashSet;
use tracing::info;

/// An edge of the waiting graph: depender, the name it depends on, and the
/// package standing behind that name
pub type Edge = (PkgId, String, PkgId);

/// Edges from `node` to packages that are still waiting to be configured
fn waiting_edges(store: &PackageStore, run: &RunContext, node: PkgId) -> Vec<Edge> {
    let pkg = store.get(node);
    let mut edges = Vec::new();

    let groups = pkg.installed.pre_depends.iter().chain(&pkg.installed.depends);
    for dep in groups {
        for poss in &dep.alternatives {
            if run.is_broken(&pkg.name, &poss.name) {
                continue;
            }

            let mut targets: Vec<PkgId> = store.find(&poss.name).into_iter().collect();
            if poss.relation.is_none() {
                targets.extend(
                    store
                        .providers(&poss.name)
                        .into_iter()
                        .filter(|p| store.get(*p).installed.provides.contains(&poss.name)),
                );
            }

            for target in targets {
                let waiting = matches!(
                    store.get(target).status,
                    Status::Unpacked | Status::HalfConfigured
                );
                if target != node && waiting {
                    edges.push((node, poss.name.clone(), target));
                }
            }
        }
    }
    edges
}

fn visit(
    store: &PackageStore,
    run: &RunContext,
    node: PkgId,
    start: PkgId,
    visited: &mut HashSet<PkgId>,
    path: &mut Vec<Edge>,
) -> bool {
    for edge in waiting_edges(store, run, node) {
        let target = edge.2;
        path.push(edge);
        if target == start {
            return true;
        }
        if visited.insert(target) && visit(store, run, target, start, visited, path) {
            return true;
        }
        path.pop();
    }
    false
}

/// Find the cycle through `start`, if any
pub fn find_cycle(store: &PackageStore, run: &RunContext, start: PkgId) -> Option<Vec<Edge>> {
    let mut visited = HashSet::new();
    visited.insert(start);
    let mut path = Vec::new();

    visit(store, run, start, start, &mut visited, &mut path).then_some(path)
}

/// Break one dependency cycle through `start`; true when an edge was broken
pub fn break_cycle(store: &PackageStore, run: &mut RunContext, start: PkgId) -> bool {
    let Some(cycle) = find_cycle(store, run, start) else {
        return false;
    };
    let Some((depender, name, _)) = cycle.first() else {
        return false;
    };

    let mut chain = store.get(start).name.clone();
    for (_, _, target) in &cycle {
        chain.push_str(" -> ");
        chain.push_str(&store.get(*target).name);
    }
    let depender = store.get(*depender).name.clone();
    info!("Breaking dependency cycle {} at {} -> {}", chain, depender, name);

    run.break_edge(&depender, name)
}
