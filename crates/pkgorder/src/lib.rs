// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

//! pkgorder - package manifests and dependency-ordered build planning
//!
//! This crate reads `package.xml` manifests (formats 1 to 3), evaluates the
//! conditions attached to their dependencies, collects the packages of a
//! workspace into a registry and computes the order in which they have to be
//! built.
//!
//! # Overview
//!
//! 1. [`parse_manifest`] turns one manifest document into a [`Package`].
//! 2. [`Registry`] holds every package of one invocation, keyed by name.
//! 3. [`build_graph`] derives a [`DependencyGraph`] for a set of
//!    [`DependencyCategory`]s under a [`ConditionContext`].
//! 4. [`topological_order`] splits the graph into groups of packages that can
//!    be built in parallel, or reports a [`CycleError`].
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeSet;
//!
//! use pkgorder::{
//!     ConditionContext, DependencyCategory, build_graph, build_registry, parse_manifest,
//!     topological_order,
//! };
//!
//! let manifest = |name: &str, deps: &str| {
//!     format!(
//!         r#"<package format="2">
//!           <name>{name}</name>
//!           <version>1.0.0</version>
//!           <description>{name}</description>
//!           <maintainer email="dev@example.com">Dev</maintainer>
//!           <license>Apache-2.0</license>
//!           {deps}
//!         </package>"#
//!     )
//! };
//! let app = parse_manifest(&manifest("app", "<depend>lib</depend>"))?;
//! let lib = parse_manifest(&manifest("lib", "<buildtool_depend>cmake</buildtool_depend>"))?;
//!
//! let registry = build_registry([(app, "src/app"), (lib, "src/lib")])?;
//! let categories: BTreeSet<_> = DependencyCategory::BUILD_ORDER.into_iter().collect();
//! let graph = build_graph(&registry, &categories, &ConditionContext::new())?;
//! let ordering = topological_order(&graph, None)?;
//! assert_eq!(ordering.flatten(), vec!["lib", "app"]);
//! # Ok::<(), pkgorder::Error>(())
//! ```

pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod order;
pub mod package;
pub mod registry;

pub use condition::{Condition, evaluate_condition};
pub use config::{ApiVersion, OrderConfig};
pub use context::{ConditionContext, RECOGNIZED_VARIABLES};
pub use error::{
    ConditionError, CycleError, DuplicatePackageError, Error, GraphError, ManifestError,
    ManifestErrorKind, Result,
};
pub use graph::{DependencyGraph, NodeKind, build_graph};
pub use manifest::{parse_manifest, parse_manifest_file, write_manifest};
pub use order::{OrderRequest, Ordering, topological_order};
pub use package::{Dependency, DependencyCategory, Format, Package, VersionConstraint};
pub use registry::{Registry, build_registry};

/// Well-known filename for package manifests.
pub const MANIFEST_FILENAME: &str = "package.xml";
