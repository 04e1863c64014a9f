// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for manifest parsing, registry construction and ordering.

use std::collections::BTreeSet;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Convenience Result type with the crate-level Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the crate.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    DuplicatePackage(#[from] DuplicatePackageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cycle(#[from] CycleError),

    /// Package is not present in the registry
    #[error("Package not found in registry: {0}")]
    #[diagnostic(code(pkgorder::not_found))]
    NotFound(String),

    /// Packages of one workspace disagree on their version
    #[error("Packages have different version numbers ({first_version} != {second_version}): {first} and {second}")]
    #[diagnostic(
        code(pkgorder::version_mismatch),
        help("Bump all packages to the same version before releasing")
    )]
    VersionMismatch {
        first: String,
        first_version: String,
        second: String,
        second_version: String,
    },

    /// Failed to read file
    #[error("Failed to read file: {path:?}")]
    #[diagnostic(code(pkgorder::read_failed))]
    ReadFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Manifest document could not be rendered
    #[error("Failed to write manifest for {package}")]
    #[diagnostic(code(pkgorder::write_failed))]
    WriteFailed {
        package: String,
        #[source]
        error: std::io::Error,
    },

    /// Manifest file could not be parsed
    #[error("Invalid package manifest {path:?}")]
    #[diagnostic(code(pkgorder::invalid_manifest_file))]
    InvalidManifestFile {
        path: PathBuf,
        #[source]
        #[diagnostic_source]
        error: ManifestError,
    },

    /// Invalid YAML in an ordering config file
    #[error("Invalid ordering config: {error}")]
    #[diagnostic(
        code(pkgorder::invalid_yaml),
        help("Check YAML syntax and ensure 'api: pkgorder/v0' is present")
    )]
    InvalidYaml {
        #[source]
        error: serde_yaml::Error,
        yaml_content: String,
    },

    /// Validation error
    #[error("Validation failed: {0}")]
    #[diagnostic(code(pkgorder::validation_failed))]
    ValidationFailed(String),
}

/// A manifest document could not be turned into a [`crate::Package`].
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
#[error("Invalid manifest for package '{}': {kind}", .package.as_deref().unwrap_or("<unknown>"))]
#[diagnostic(code(pkgorder::invalid_manifest))]
pub struct ManifestError {
    /// Name of the package, when the parser got far enough to read it.
    pub package: Option<String>,
    pub kind: ManifestErrorKind,
}

impl ManifestError {
    pub(crate) fn new(package: Option<&str>, kind: ManifestErrorKind) -> Self {
        Self {
            package: package.map(ToOwned::to_owned),
            kind,
        }
    }

    pub fn kind(&self) -> &ManifestErrorKind {
        &self.kind
    }

    /// The element or field the error refers to.
    pub fn element(&self) -> &str {
        match &self.kind {
            ManifestErrorKind::UnsupportedFormat { .. } => "format",
            ManifestErrorKind::MissingField { field } => field,
            ManifestErrorKind::InvalidCondition { element, .. } => element,
            ManifestErrorKind::MalformedElement { element, .. } => element,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestErrorKind {
    #[error("unsupported format version '{format}' (expected 1, 2 or 3)")]
    UnsupportedFormat { format: String },

    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("invalid condition on '{element}': {error}")]
    InvalidCondition {
        element: String,
        #[source]
        error: ConditionError,
    },

    #[error("malformed '{element}': {reason}")]
    MalformedElement { element: String, reason: String },
}

impl ManifestErrorKind {
    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }

    pub(crate) fn malformed(element: &str, reason: impl Into<String>) -> Self {
        Self::MalformedElement {
            element: element.to_string(),
            reason: reason.into(),
        }
    }
}

/// A condition expression could not be parsed.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("condition '{expression}' failed to parse at offset {offset}")]
    #[diagnostic(
        code(pkgorder::malformed_condition),
        help("Conditions compare $VARIABLES and values with ==, !=, <, <=, >, >= and combine them with and, or, not")
    )]
    Malformed { expression: String, offset: usize },

    #[error("condition is empty")]
    #[diagnostic(code(pkgorder::empty_condition))]
    Empty,
}

/// Two different manifests declare the same package name.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
#[error("Two packages with the same name '{name}' in the workspace: {existing:?} and {duplicate:?}")]
#[diagnostic(
    code(pkgorder::duplicate_package),
    help("Package names must be unique; remove or rename one of the packages")
)]
pub struct DuplicatePackageError {
    pub name: String,
    pub existing: PathBuf,
    pub duplicate: PathBuf,
}

#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A package lists itself as one of its dependencies
    #[error("Package '{package}' depends on itself ({category} dependency)")]
    #[diagnostic(
        code(pkgorder::self_dependency),
        help("Remove the dependency on '{package}' from its own manifest")
    )]
    SelfDependency { package: String, category: String },
}

/// The dependency graph contains at least one cycle.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
#[error("Circular dependency detected between: {}", join_names(.members))]
#[diagnostic(
    code(pkgorder::cycle),
    help("Break the cycle by removing one of the dependencies between these packages")
)]
pub struct CycleError {
    /// Every package that is part of a cycle.
    pub members: BTreeSet<String>,
    /// Each strongly connected component separately, sorted.
    pub cycles: Vec<Vec<String>>,
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
