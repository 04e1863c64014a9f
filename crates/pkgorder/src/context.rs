// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

//! Build context used when evaluating dependency conditions.

use std::collections::BTreeMap;

#[cfg(test)]
#[path = "./context_test.rs"]
mod context_test;

/// Variables that manifests commonly reference in conditions.
///
/// [`ConditionContext::from_env`] captures exactly these from the process
/// environment.
pub const RECOGNIZED_VARIABLES: &[&str] = &[
    "ROS_VERSION",
    "ROS_DISTRO",
    "ROS_PYTHON_VERSION",
    "ROS_OS_OVERRIDE",
    "ROS_PLATFORM",
    "os_name",
    "os_version",
    "platform_release",
];

/// Flat key/value variables that conditions are evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionContext {
    variables: BTreeMap<String, String>,
}

impl ConditionContext {
    /// Create an empty context; every variable evaluates to the empty string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the recognized build variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a context by looking up each recognized variable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut context = Self::new();
        for key in RECOGNIZED_VARIABLES {
            if let Some(value) = lookup(key) {
                context.insert(*key, value);
            }
        }
        tracing::trace!(variables = context.len(), "captured condition context");
        context
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    /// Overlay `other` on top of this context; keys in `other` win.
    pub fn merge(&mut self, other: &ConditionContext) {
        for (key, value) in &other.variables {
            self.variables.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for ConditionContext
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Self::new();
        for (key, value) in iter {
            context.insert(key, value);
        }
        context
    }
}
