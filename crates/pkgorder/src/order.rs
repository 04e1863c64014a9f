// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

//! Topological ordering of a [`DependencyGraph`] into parallel build groups.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;

use crate::error::CycleError;
use crate::graph::{DependencyGraph, NodeKind};

#[cfg(test)]
#[path = "./order_test.rs"]
mod order_test;

/// Result of ordering a graph.
///
/// Every package in `groups[i]` only depends on packages of earlier groups,
/// so the members of one group can be processed in parallel. Packages that
/// export a message generator are placed ahead of their peers: when one is
/// ready, the group holds only message generators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordering {
    /// Sequential groups, each sorted by name.
    pub groups: Vec<Vec<String>>,
    /// Requested packages that cannot be ordered because they need a package
    /// outside of the request that is not marked as satisfied. Sorted.
    pub blocked: Vec<String>,
}

impl Ordering {
    /// The groups concatenated, for consumers that process one package at a time.
    pub fn flatten(&self) -> Vec<&str> {
        self.groups
            .iter()
            .flat_map(|group| group.iter().map(String::as_str))
            .collect()
    }

    /// Number of ordered packages.
    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Index of the group that contains `name`.
    pub fn group_of(&self, name: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| group.iter().any(|member| member == name))
    }
}

/// Order every registry package of `graph`, or only those in `subset`.
pub fn topological_order(
    graph: &DependencyGraph,
    subset: Option<&BTreeSet<String>>,
) -> Result<Ordering, CycleError> {
    let mut request = OrderRequest::new(graph);
    if let Some(subset) = subset {
        request = request.subset(subset.iter().cloned());
    }
    request.compute()
}

/// Options for ordering a graph.
///
/// Packages that are neither requested, excluded nor satisfied still take
/// part in the ordering: a dependency path that runs through them is
/// honoured between the requested packages on both ends.
#[derive(Debug, Clone)]
pub struct OrderRequest<'a> {
    graph: &'a DependencyGraph,
    subset: Option<BTreeSet<String>>,
    exclude: BTreeSet<String>,
    satisfied: BTreeSet<String>,
}

impl<'a> OrderRequest<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self {
            graph,
            subset: None,
            exclude: BTreeSet::new(),
            satisfied: BTreeSet::new(),
        }
    }

    /// Restrict the result to these packages.
    pub fn subset<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subset
            .get_or_insert_with(BTreeSet::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Never order these packages; dependents treat them as already built.
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    /// Packages outside of the subset that are already available.
    pub fn satisfied<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.satisfied.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn compute(&self) -> Result<Ordering, CycleError> {
        let graph = self.graph;
        let inner = graph.inner();
        let selected = self.selected();

        // Everything the selection can reach has to be acyclic, even the
        // packages that will not end up in the result.
        let reachable = self.reachable(&selected);
        let (order, unplaced) = waves(graph, &reachable);
        if unplaced > 0 {
            return Err(cycle_error(graph, &reachable));
        }

        let mut effective: DiGraphMap<NodeIndex, ()> = DiGraphMap::new();
        let mut blocked: BTreeSet<NodeIndex> = BTreeSet::new();
        for index in order.iter().flatten().copied() {
            if !selected.contains(&index) {
                continue;
            }
            let (dependencies, missing) = self.effective_dependencies(index, &selected);
            if missing.is_some() || dependencies.iter().any(|dep| blocked.contains(dep)) {
                tracing::debug!(
                    package = %inner[index].name,
                    missing = ?missing.map(|missing| inner[missing].name.as_str()),
                    "package is blocked"
                );
                blocked.insert(index);
                continue;
            }
            effective.add_node(index);
            for dependency in dependencies {
                effective.add_edge(index, dependency, ());
            }
        }

        let (groups, _) = waves(graph, &effective);
        let mut blocked: Vec<String> = blocked
            .into_iter()
            .map(|index| inner[index].name.clone())
            .collect();
        blocked.sort();
        let ordering = Ordering {
            groups: groups
                .into_iter()
                .map(|group| {
                    group
                        .into_iter()
                        .map(|index| inner[index].name.clone())
                        .collect()
                })
                .collect(),
            blocked,
        };
        tracing::debug!(
            groups = ordering.groups.len(),
            packages = ordering.len(),
            blocked = ordering.blocked.len(),
            "computed topological order"
        );
        Ok(ordering)
    }

    /// Registry packages that were asked for, without the excluded ones.
    fn selected(&self) -> BTreeSet<NodeIndex> {
        let graph = self.graph;
        let candidates: Vec<&str> = match &self.subset {
            None => graph.packages().collect(),
            Some(subset) => subset
                .iter()
                .filter(|name| {
                    let found = graph.is_package(name);
                    if !found {
                        tracing::warn!(package = %name, "requested package is not in the graph");
                    }
                    found
                })
                .map(String::as_str)
                .collect(),
        };
        candidates
            .into_iter()
            .filter(|name| !self.exclude.contains(*name))
            .filter_map(|name| graph.index_of(name))
            .collect()
    }

    /// The packages reachable from `selected`, with the edges between them.
    fn reachable(&self, selected: &BTreeSet<NodeIndex>) -> DiGraphMap<NodeIndex, ()> {
        let graph = self.graph;
        let inner = graph.inner();
        let mut plan = DiGraphMap::new();
        let mut dfs = Dfs::empty(inner);
        for start in selected {
            dfs.move_to(*start);
            while let Some(index) = dfs.next(inner) {
                if inner[index].kind == NodeKind::Package {
                    plan.add_node(index);
                }
            }
        }
        let nodes: Vec<NodeIndex> = plan.nodes().collect();
        for index in nodes {
            for dependency in graph.package_dependencies_of(index) {
                plan.add_edge(index, dependency, ());
            }
        }
        plan
    }

    /// Selected packages `index` needs, looking through packages that are
    /// satisfied or excluded, together with the first unavailable package
    /// found on the way.
    fn effective_dependencies(
        &self,
        index: NodeIndex,
        selected: &BTreeSet<NodeIndex>,
    ) -> (BTreeSet<NodeIndex>, Option<NodeIndex>) {
        let graph = self.graph;
        let inner = graph.inner();
        let mut dependencies = BTreeSet::new();
        let mut missing: Option<NodeIndex> = None;
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeIndex> = graph.package_dependencies_of(index).collect();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let name = inner[current].name.as_str();
            if selected.contains(&current) {
                dependencies.insert(current);
            } else if self.satisfied.contains(name) || self.exclude.contains(name) {
                stack.extend(graph.package_dependencies_of(current));
            } else if missing.is_none_or(|first| name < inner[first].name.as_str()) {
                missing = Some(current);
            }
        }
        (dependencies, missing)
    }
}

/// Split `plan` into waves of nodes whose dependencies all sit in earlier
/// waves, each sorted by name.
///
/// When message generators are among the ready nodes they form a wave of
/// their own and the other ready nodes wait for the next one. Also returns
/// how many nodes could not be placed because of a cycle.
fn waves(
    graph: &DependencyGraph,
    plan: &DiGraphMap<NodeIndex, ()>,
) -> (Vec<Vec<NodeIndex>>, usize) {
    let inner = graph.inner();
    let mut pending: BTreeMap<NodeIndex, usize> = plan
        .nodes()
        .map(|node| (node, plan.neighbors_directed(node, Direction::Outgoing).count()))
        .collect();

    let mut waves = Vec::new();
    loop {
        let ready: Vec<NodeIndex> = pending
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        if ready.is_empty() {
            break;
        }
        let generators: Vec<NodeIndex> = ready
            .iter()
            .copied()
            .filter(|node| inner[*node].message_generator)
            .collect();
        let mut wave = if generators.is_empty() { ready } else { generators };
        wave.sort_by(|a, b| inner[*a].name.cmp(&inner[*b].name));

        for node in &wave {
            pending.remove(node);
            for dependent in plan.neighbors_directed(*node, Direction::Incoming) {
                if let Some(degree) = pending.get_mut(&dependent) {
                    *degree -= 1;
                }
            }
        }
        waves.push(wave);
    }

    (waves, pending.len())
}

/// Collect the non-trivial strongly connected components of `plan`.
///
/// Nodes that only depend on a cycle form trivial components and are not
/// reported.
fn cycle_error(graph: &DependencyGraph, plan: &DiGraphMap<NodeIndex, ()>) -> CycleError {
    let inner = graph.inner();
    let mut cycles: Vec<Vec<String>> = tarjan_scc(plan)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || plan.contains_edge(component[0], component[0])
        })
        .map(|component| {
            let mut names: Vec<String> = component
                .into_iter()
                .map(|index| inner[index].name.clone())
                .collect();
            names.sort();
            names
        })
        .collect();
    cycles.sort();
    let members = cycles.iter().flatten().cloned().collect();
    tracing::debug!(cycles = cycles.len(), "dependency cycle detected");
    CycleError { members, cycles }
}
