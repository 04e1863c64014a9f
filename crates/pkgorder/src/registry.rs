// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

//! In-memory collection of the packages of one build invocation.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::context::ConditionContext;
use crate::error::{DuplicatePackageError, Error};
use crate::package::Package;

#[cfg(test)]
#[path = "./registry_test.rs"]
mod registry_test;

/// A registered package together with where its manifest was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub package: Package,
    pub location: PathBuf,
}

/// Packages keyed by name, in insertion order.
///
/// Built once per invocation and read-only afterwards. Inserting is not
/// synchronized; callers that parse manifests in parallel collect the
/// results first and insert them from a single thread.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: IndexMap<String, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package found at `location`.
    ///
    /// Inserting the same name from the same location again is a no-op; the
    /// same name from a different location is an error.
    pub fn insert<P: Into<PathBuf>>(
        &mut self,
        package: Package,
        location: P,
    ) -> Result<(), DuplicatePackageError> {
        let location = location.into();
        if let Some(existing) = self.entries.get(&package.name) {
            if existing.location == location {
                tracing::trace!(package = %package.name, ?location, "package already registered");
                return Ok(());
            }
            return Err(DuplicatePackageError {
                name: package.name,
                existing: existing.location.clone(),
                duplicate: location,
            });
        }
        tracing::debug!(package = %package.name, ?location, "registered package");
        self.entries
            .insert(package.name.clone(), RegistryEntry { package, location });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.entries.get(name).map(|entry| &entry.package)
    }

    /// Like [`Registry::get`] but reports a missing package as an error.
    pub fn lookup(&self, name: &str) -> crate::Result<&Package> {
        self.get(name).ok_or_else(|| Error::NotFound(name.to_string()))
    }

    pub fn location(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(|entry| entry.location.as_path())
    }

    pub fn entry(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, package)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Package)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), &entry.package))
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Names of the packages that are members of `group` under `context`, sorted.
    pub fn group_members(&self, group: &str, context: &ConditionContext) -> Vec<&str> {
        let mut members: Vec<&str> = self
            .iter()
            .filter(|(_, package)| package.groups(context).any(|name| name == group))
            .map(|(name, _)| name)
            .collect();
        members.sort_unstable();
        members
    }

    /// Check that every package carries the same version number.
    pub fn verify_equal_versions(&self) -> crate::Result<()> {
        let mut packages = self.iter();
        let Some((first, reference)) = packages.next() else {
            return Ok(());
        };
        for (name, package) in packages {
            if package.version != reference.version {
                return Err(Error::VersionMismatch {
                    first: first.to_string(),
                    first_version: reference.version.clone(),
                    second: name.to_string(),
                    second_version: package.version.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Build a registry from `(package, location)` pairs, failing on the first
/// conflicting duplicate.
pub fn build_registry<I, P>(packages: I) -> Result<Registry, DuplicatePackageError>
where
    I: IntoIterator<Item = (Package, P)>,
    P: Into<PathBuf>,
{
    let mut registry = Registry::new();
    for (package, location) in packages {
        registry.insert(package, location)?;
    }
    Ok(registry)
}
