// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

//! Ordering configuration files.
//!
//! ```yaml
//! api: pkgorder/v0
//! categories: [build, buildtool, build_export, buildtool_export, run]
//! inherit_env: true
//! context:
//!   ROS_VERSION: 2
//! subset: [my_app]
//! exclude: [broken_pkg]
//! satisfied: [prebuilt_lib]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::context::ConditionContext;
use crate::graph::{DependencyGraph, build_graph};
use crate::order::{OrderRequest, Ordering};
use crate::package::DependencyCategory;
use crate::registry::Registry;

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

/// API version for configuration files.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "pkgorder/v0")]
    V0,
}

/// Helper for two-stage deserialization to determine API version first.
#[derive(Deserialize)]
struct ApiVersionMapping {
    #[serde(default)]
    api: ApiVersion,
}

/// What to order and under which build variables.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct OrderConfig {
    pub api: ApiVersion,

    /// Dependency categories that produce edges; the build order
    /// categories when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    /// Start from the process environment before applying `context`.
    #[serde(default)]
    pub inherit_env: bool,

    /// Condition variables. Scalars of any type are accepted.
    #[serde(
        default,
        deserialize_with = "deserialize_variables",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub context: BTreeMap<String, String>,

    /// Only order these packages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub satisfied: Vec<String>,

    /// Path to the file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl OrderConfig {
    /// Parse a configuration from YAML.
    pub fn from_yaml<S: Into<String>>(yaml: S) -> crate::Result<Self> {
        let yaml = yaml.into();

        let value: serde_yaml::Value =
            serde_yaml::from_str(&yaml).map_err(|e| crate::Error::InvalidYaml {
                error: e,
                yaml_content: yaml.clone(),
            })?;

        let with_version: ApiVersionMapping =
            serde_yaml::from_value(value.clone()).map_err(|e| crate::Error::InvalidYaml {
                error: e,
                yaml_content: yaml.clone(),
            })?;

        let config: Self = match with_version.api {
            ApiVersion::V0 => {
                serde_yaml::from_value(value).map_err(|e| crate::Error::InvalidYaml {
                    error: e,
                    yaml_content: yaml,
                })?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| crate::Error::ReadFailed {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config = Self::from_yaml(yaml)?;
        config.source_path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "loaded order config");
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.categories().map(|_| ())
    }

    /// The configured categories, parsed.
    pub fn categories(&self) -> crate::Result<BTreeSet<DependencyCategory>> {
        if self.categories.is_empty() {
            return Ok(DependencyCategory::BUILD_ORDER.into_iter().collect());
        }
        self.categories
            .iter()
            .map(|category| {
                category
                    .parse::<DependencyCategory>()
                    .map_err(crate::Error::ValidationFailed)
            })
            .collect()
    }

    /// The condition context: the environment when inherited, overridden by
    /// the configured variables.
    pub fn context(&self) -> ConditionContext {
        let mut context = if self.inherit_env {
            ConditionContext::from_env()
        } else {
            ConditionContext::new()
        };
        for (key, value) in &self.context {
            context.insert(key.as_str(), value.as_str());
        }
        context
    }

    /// An ordering request over `graph` with the configured selection.
    pub fn request<'g>(&self, graph: &'g DependencyGraph) -> OrderRequest<'g> {
        let mut request = OrderRequest::new(graph)
            .exclude(self.exclude.iter().cloned())
            .satisfied(self.satisfied.iter().cloned());
        if let Some(subset) = &self.subset {
            request = request.subset(subset.iter().cloned());
        }
        request
    }

    /// Build the graph of `registry` and order it as configured.
    pub fn order(&self, registry: &Registry) -> crate::Result<Ordering> {
        let graph = build_graph(registry, &self.categories()?, &self.context())?;
        Ok(self.request(&graph).compute()?)
    }
}

fn deserialize_variables<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    BTreeMap::<String, Value>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(value) => value,
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null => String::new(),
                _ => {
                    return Err(D::Error::custom(format!(
                        "context variable '{key}' must be a scalar"
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}
