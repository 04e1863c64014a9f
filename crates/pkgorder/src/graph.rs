// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

//! Dependency graph derived from a [`Registry`].
//!
//! Nodes are package names. Names that are not in the registry become
//! external nodes: they have no outgoing edges and are treated as already
//! satisfied by the ordering engine. The graph is never mutated after it is
//! built; [`DependencyGraph::filter`] returns a new graph.
//!
//! Edges point from a package to the packages it depends on, so the
//! outgoing neighbors of a node are its dependencies and the incoming ones
//! its dependents.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::context::ConditionContext;
use crate::error::GraphError;
use crate::package::{DependencyCategory, Package};
use crate::registry::Registry;

#[cfg(test)]
#[path = "./graph_test.rs"]
mod graph_test;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A package present in the registry.
    Package,
    /// A name that is depended upon but not part of the registry.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    /// The package exports a message generator and is ordered ahead of its
    /// peers.
    pub message_generator: bool,
}

/// Directed graph of "depends on" edges between package names.
///
/// Edge weights are the categories that produced the edge.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<Node, BTreeSet<DependencyCategory>>,
    index: BTreeMap<String, NodeIndex>,
}

/// Build the dependency graph of `registry` for the given categories.
///
/// A dependency counts when its category is one of `categories` and its
/// condition holds under `context`. Group dependencies count as build and
/// exec dependencies on every member of the group.
///
/// Transitive categories (see [`DependencyCategory::is_transitive`]) do not
/// produce edges from the declaring package. Instead, a package that
/// depends on `lib` through a direct category also depends on every
/// registry package `lib` reaches through transitive categories. When
/// `categories` holds only transitive ones they are used as direct
/// categories.
pub fn build_graph(
    registry: &Registry,
    categories: &BTreeSet<DependencyCategory>,
    context: &ConditionContext,
) -> Result<DependencyGraph, GraphError> {
    let (direct, transitive) = split_categories(categories);

    let mut graph = DependencyGraph::default();
    for (name, package) in registry.iter() {
        graph.add_node(name, NodeKind::Package, package.message_generator().is_some());
    }

    for (name, package) in registry.iter() {
        let mut passed_on = BTreeSet::new();
        for (dependency, category) in declared(registry, package, context) {
            if !categories.contains(&category) {
                continue;
            }
            if dependency == name {
                return Err(GraphError::SelfDependency {
                    package: name.to_string(),
                    category: category.to_string(),
                });
            }
            if !direct.contains(&category) {
                continue;
            }
            graph.add_edge(name, dependency, category);

            let mut stack = vec![dependency];
            while let Some(current) = stack.pop() {
                if !passed_on.insert(current) {
                    continue;
                }
                let Some(provider) = registry.get(current) else {
                    continue;
                };
                for (needed, category) in declared(registry, provider, context) {
                    if transitive.contains(&category) && registry.contains(needed) {
                        // reaching `name` again closes a cycle and is kept
                        graph.add_edge(name, needed, category);
                        stack.push(needed);
                    }
                }
            }
        }
    }

    tracing::debug!(
        packages = registry.len(),
        externals = graph.externals().count(),
        edges = graph.edge_count(),
        "built dependency graph"
    );
    Ok(graph)
}

/// Split `categories` into the direct and the transitive ones.
fn split_categories(
    categories: &BTreeSet<DependencyCategory>,
) -> (BTreeSet<DependencyCategory>, BTreeSet<DependencyCategory>) {
    let (direct, transitive): (BTreeSet<_>, BTreeSet<_>) = categories
        .iter()
        .copied()
        .partition(|category| !category.is_transitive());
    if direct.is_empty() {
        (transitive, BTreeSet::new())
    } else {
        (direct, transitive)
    }
}

/// Dependencies of `package` that hold under `context`, with group
/// dependencies expanded to their members.
fn declared<'r>(
    registry: &'r Registry,
    package: &'r Package,
    context: &ConditionContext,
) -> Vec<(&'r str, DependencyCategory)> {
    let mut declared: Vec<(&'r str, DependencyCategory)> = package
        .dependencies
        .iter()
        .filter(|dependency| dependency.applies(context))
        .map(|dependency| (dependency.name.as_str(), dependency.category))
        .collect();
    for group in package
        .group_depends
        .iter()
        .filter(|group| group.applies(context))
    {
        for member in registry.group_members(&group.name, context) {
            if member == package.name {
                continue;
            }
            declared.push((member, DependencyCategory::Build));
            declared.push((member, DependencyCategory::Exec));
        }
    }
    declared
}

impl DependencyGraph {
    fn add_node(&mut self, name: &str, kind: NodeKind, message_generator: bool) -> NodeIndex {
        if let Some(index) = self.index.get(name) {
            return *index;
        }
        let index = self.graph.add_node(Node {
            name: name.to_string(),
            kind,
            message_generator,
        });
        self.index.insert(name.to_string(), index);
        index
    }

    fn add_edge(&mut self, from: &str, to: &str, category: DependencyCategory) {
        let Some(source) = self.index.get(from).copied() else {
            return;
        };
        let target = self.add_node(to, NodeKind::External, false);
        match self.graph.find_edge(source, target) {
            Some(edge) => {
                self.graph[edge].insert(category);
            }
            None => {
                self.graph
                    .add_edge(source, target, BTreeSet::from([category]));
            }
        }
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|index| &self.graph[*index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.node(name)
            .is_some_and(|node| node.kind == NodeKind::External)
    }

    /// Whether `name` is a registry package of this graph.
    pub fn is_package(&self, name: &str) -> bool {
        self.node(name)
            .is_some_and(|node| node.kind == NodeKind::Package)
    }

    pub fn is_message_generator(&self, name: &str) -> bool {
        self.node(name).is_some_and(|node| node.message_generator)
    }

    /// Registry packages, sorted by name.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.nodes_of(NodeKind::Package)
    }

    /// External names, sorted.
    pub fn externals(&self) -> impl Iterator<Item = &str> {
        self.nodes_of(NodeKind::External)
    }

    fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &str> {
        self.index
            .iter()
            .filter(move |(_, index)| self.graph[**index].kind == kind)
            .map(|(name, _)| name.as_str())
    }

    /// Direct dependencies of `name`, external ones included, sorted.
    pub fn dependencies(&self, name: &str) -> impl Iterator<Item = &str> {
        self.neighbors(name, Direction::Outgoing).into_iter()
    }

    /// Direct dependencies of `name` that are registry packages.
    pub fn package_dependencies(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependencies(name)
            .filter(move |dependency| self.is_package(dependency))
    }

    /// Packages that directly depend on `name`, sorted.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .index
            .get(name)
            .into_iter()
            .flat_map(|index| self.graph.neighbors_directed(*index, direction))
            .map(|neighbor| self.graph[neighbor].name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Categories of the edge from `from` to `to`.
    pub fn edge_categories(&self, from: &str, to: &str) -> Option<&BTreeSet<DependencyCategory>> {
        let source = self.index.get(from)?;
        let target = self.index.get(to)?;
        let edge = self.graph.find_edge(*source, *target)?;
        self.graph.edge_weight(edge)
    }

    /// Every registry package reachable from `name`, not including `name`.
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<&str> {
        let mut seen = BTreeSet::new();
        let Some(start) = self.index.get(name).copied() else {
            return seen;
        };
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(index) = dfs.next(&self.graph) {
            let node = &self.graph[index];
            if index != start && node.kind == NodeKind::Package {
                seen.insert(node.name.as_str());
            }
        }
        seen
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Edges as `(dependent, dependency)` name pairs, sorted.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<(&str, &str)> = self
            .graph
            .edge_indices()
            .filter_map(|edge| self.graph.edge_endpoints(edge))
            .map(|(source, target)| {
                (
                    self.graph[source].name.as_str(),
                    self.graph[target].name.as_str(),
                )
            })
            .collect();
        edges.sort_unstable();
        edges
    }

    pub(crate) fn inner(&self) -> &DiGraph<Node, BTreeSet<DependencyCategory>> {
        &self.graph
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub(crate) fn package_dependencies_of(
        &self,
        index: NodeIndex,
    ) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .neighbors_directed(index, Direction::Outgoing)
            .filter(move |dependency| self.graph[*dependency].kind == NodeKind::Package)
    }

    /// A new graph that only keeps the packages accepted by `keep`.
    ///
    /// Edges pointing at a dropped package are kept but the target turns
    /// into an external node, so the dropped package counts as satisfied in
    /// this view.
    pub fn filter<F>(&self, keep: F) -> DependencyGraph
    where
        F: Fn(&str) -> bool,
    {
        let mut filtered = DependencyGraph::default();
        for index in self.index.values() {
            let node = &self.graph[*index];
            if node.kind == NodeKind::Package && keep(&node.name) {
                filtered.add_node(&node.name, NodeKind::Package, node.message_generator);
            }
        }
        for edge in self.graph.edge_indices() {
            let Some((source, target)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let from = &self.graph[source].name;
            if !filtered.is_package(from) {
                continue;
            }
            for category in &self.graph[edge] {
                filtered.add_edge(from, &self.graph[target].name, *category);
            }
        }
        filtered
    }
}
