// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

//! In-memory model of a parsed package manifest.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::condition::Condition;
use crate::context::ConditionContext;

#[cfg(test)]
#[path = "./package_test.rs"]
mod package_test;

/// Manifest schema generation; selects which elements are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Format {
    #[default]
    V1 = 1,
    V2 = 2,
    V3 = 3,
}

impl Format {
    pub const LATEST: Format = Format::V3;

    pub fn from_number(number: u32) -> Option<Self> {
        match number {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    pub fn number(self) -> u32 {
        self as u32
    }

    /// Conditions, groups and `*_depend` condition attributes arrived in format 3.
    pub fn supports_conditions(self) -> bool {
        self >= Self::V3
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Classification of a dependency's applicability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyCategory {
    Build,
    BuildExport,
    BuildTool,
    BuildToolExport,
    Exec,
    /// Format 1 only: needed at run time and by dependents at build time.
    Run,
    Test,
    Doc,
}

impl DependencyCategory {
    pub const ALL: [DependencyCategory; 8] = [
        Self::Build,
        Self::BuildExport,
        Self::BuildTool,
        Self::BuildToolExport,
        Self::Exec,
        Self::Run,
        Self::Test,
        Self::Doc,
    ];

    /// Categories that decide the build order.
    ///
    /// Build and buildtool dependencies are needed directly. The remaining
    /// ones are only followed transitively through those, see
    /// [`DependencyCategory::is_transitive`].
    pub const BUILD_ORDER: [DependencyCategory; 6] = [
        Self::Build,
        Self::BuildTool,
        Self::BuildExport,
        Self::BuildToolExport,
        Self::Exec,
        Self::Run,
    ];

    /// Whether this category is needed by the dependents of a package rather
    /// than by the package itself.
    ///
    /// When a graph is built for a mix of categories, a package does not
    /// depend on its own transitive dependencies. They are added to every
    /// package that build-depends on it instead.
    pub fn is_transitive(self) -> bool {
        matches!(
            self,
            Self::BuildExport | Self::BuildToolExport | Self::Exec | Self::Run
        )
    }

    /// Name of the manifest element that declares this category.
    pub fn element_name(self) -> &'static str {
        match self {
            Self::Build => "build_depend",
            Self::BuildExport => "build_export_depend",
            Self::BuildTool => "buildtool_depend",
            Self::BuildToolExport => "buildtool_export_depend",
            Self::Exec => "exec_depend",
            Self::Run => "run_depend",
            Self::Test => "test_depend",
            Self::Doc => "doc_depend",
        }
    }

    pub fn from_element_name(element: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.element_name() == element)
    }

    /// Whether a manifest of `format` may declare this category directly.
    pub fn is_legal_in(self, format: Format) -> bool {
        match self {
            Self::Build | Self::BuildTool | Self::Test => true,
            Self::Run => format == Format::V1,
            Self::BuildExport | Self::BuildToolExport | Self::Exec | Self::Doc => {
                format >= Format::V2
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::BuildExport => "build_export",
            Self::BuildTool => "buildtool",
            Self::BuildToolExport => "buildtool_export",
            Self::Exec => "exec",
            Self::Run => "run",
            Self::Test => "test",
            Self::Doc => "doc",
        }
    }
}

impl fmt::Display for DependencyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| format!("unknown dependency category '{s}'"))
    }
}

/// Optional bounds on the version of a dependency.
///
/// Every bound is independent; an empty constraint accepts any version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionConstraint {
    pub lt: Option<String>,
    pub lte: Option<String>,
    pub eq: Option<String>,
    pub gte: Option<String>,
    pub gt: Option<String>,
}

impl VersionConstraint {
    /// Attribute names in the order they are written to a manifest.
    pub const ATTRIBUTES: [&'static str; 5] =
        ["version_lt", "version_lte", "version_eq", "version_gte", "version_gt"];

    pub fn is_empty(&self) -> bool {
        self.attributes().next().is_none()
    }

    /// `(attribute, value)` pairs of the bounds that are set.
    pub fn attributes(&self) -> impl Iterator<Item = (&'static str, &str)> {
        Self::ATTRIBUTES
            .into_iter()
            .zip([&self.lt, &self.lte, &self.eq, &self.gte, &self.gt])
            .filter_map(|(name, value)| value.as_deref().map(|value| (name, value)))
    }

    pub(crate) fn set(&mut self, attribute: &str, value: String) -> bool {
        let slot = match attribute {
            "version_lt" => &mut self.lt,
            "version_lte" => &mut self.lte,
            "version_eq" => &mut self.eq,
            "version_gte" => &mut self.gte,
            "version_gt" => &mut self.gt,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    pub fn is_satisfied_by(&self, version: &str) -> bool {
        let check = |bound: &Option<String>, accept: fn(Ordering) -> bool| {
            bound
                .as_deref()
                .is_none_or(|bound| accept(compare_versions(version, bound)))
        };
        check(&self.lt, Ordering::is_lt)
            && check(&self.lte, Ordering::is_le)
            && check(&self.eq, Ordering::is_eq)
            && check(&self.gte, Ordering::is_ge)
            && check(&self.gt, Ordering::is_gt)
    }
}

/// Compare dot separated versions component by component.
///
/// Numeric components compare as numbers, anything else lexically, and a
/// missing component counts as `0`.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let mut left_parts = left.split('.');
    let mut right_parts = right.split('.');
    loop {
        let (l, r) = match (left_parts.next(), right_parts.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => (l.unwrap_or("0"), r.unwrap_or("0")),
        };
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            _ => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

/// A declared dependency on another package or an external artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub category: DependencyCategory,
    pub constraint: VersionConstraint,
    pub condition: Option<Condition>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, category: DependencyCategory) -> Self {
        Self {
            name: name.into(),
            category,
            constraint: VersionConstraint::default(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_constraint(mut self, constraint: VersionConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    /// Whether this dependency applies under `context`; no condition means always.
    pub fn applies(&self, context: &ConditionContext) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition.evaluate(context))
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A `conflict` or `replace` relation; shaped like a dependency but never
/// part of the build graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub constraint: VersionConstraint,
    pub condition: Option<Condition>,
}

/// A maintainer or author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub name: String,
    pub email: Option<String>,
}

impl Person {
    pub fn new(name: impl Into<String>, email: Option<&str>) -> Self {
        Self {
            name: name.into(),
            email: email.map(ToOwned::to_owned),
        }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} <{}>", self.name, email),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlType {
    #[default]
    Website,
    Repository,
    Bugtracker,
}

impl UrlType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Repository => "repository",
            Self::Bugtracker => "bugtracker",
        }
    }
}

impl FromStr for UrlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "website" => Ok(Self::Website),
            "repository" => Ok(Self::Repository),
            "bugtracker" => Ok(Self::Bugtracker),
            other => Err(format!(
                "unknown url type '{other}' (expected website, repository or bugtracker)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    pub url: String,
    pub kind: UrlType,
}

/// Package description as written plus a derived plaintext rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    /// Inner markup of the description element, trimmed.
    pub raw: String,
    /// Text content with tags removed and whitespace collapsed.
    pub plain: String,
}

impl Description {
    pub fn from_plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            plain: collapse_whitespace(&text),
            raw: text,
        }
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One child of the `export` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub tag: String,
    pub attributes: IndexMap<String, String>,
    /// Inner markup, trimmed.
    pub content: String,
    pub condition: Option<Condition>,
}

impl Export {
    pub fn new(tag: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: IndexMap::new(),
            content: content.into(),
            condition: None,
        }
    }

    pub fn applies(&self, context: &ConditionContext) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition.evaluate(context))
    }
}

/// A dependency on every package that is a member of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDependency {
    pub name: String,
    pub condition: Option<Condition>,
}

impl GroupDependency {
    pub fn applies(&self, context: &ConditionContext) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition.evaluate(context))
    }
}

/// Declares that a package belongs to a named group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembership {
    pub name: String,
    pub condition: Option<Condition>,
}

impl GroupMembership {
    pub fn applies(&self, context: &ConditionContext) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition.evaluate(context))
    }
}

/// The parsed, validated model of one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub format: Format,
    pub name: String,
    pub version: String,
    pub version_abi: Option<String>,
    pub description: Description,
    pub maintainers: Vec<Person>,
    pub licenses: Vec<String>,
    pub urls: Vec<Url>,
    pub authors: Vec<Person>,
    pub dependencies: Vec<Dependency>,
    pub conflicts: Vec<Relation>,
    pub replaces: Vec<Relation>,
    pub group_depends: Vec<GroupDependency>,
    pub member_of_groups: Vec<GroupMembership>,
    pub exports: Vec<Export>,
    /// Top-level elements that were not understood but tolerated.
    pub unknown_elements: Vec<String>,
}

impl Package {
    /// A package with the given identity and no metadata; mostly useful to
    /// assemble registries programmatically.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            format: Format::default(),
            name: name.into(),
            version: version.into(),
            version_abi: None,
            description: Description::default(),
            maintainers: Vec::new(),
            licenses: Vec::new(),
            urls: Vec::new(),
            authors: Vec::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            replaces: Vec::new(),
            group_depends: Vec::new(),
            member_of_groups: Vec::new(),
            exports: Vec::new(),
            unknown_elements: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Dependencies in any of `categories` whose condition holds under `context`.
    pub fn dependencies_for<'a>(
        &'a self,
        categories: &'a BTreeSet<DependencyCategory>,
        context: &'a ConditionContext,
    ) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.dependencies
            .iter()
            .filter(move |dep| categories.contains(&dep.category) && dep.applies(context))
    }

    /// Dependencies of a single category regardless of conditions.
    pub fn dependencies_of(
        &self,
        category: DependencyCategory,
    ) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(move |dep| dep.category == category)
    }

    /// All exports with the given tag, in manifest order.
    pub fn exports_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Export> + 'a {
        self.exports.iter().filter(move |export| export.tag == tag)
    }

    pub fn is_metapackage(&self) -> bool {
        self.exports_named("metapackage").next().is_some()
    }

    /// Content of the first `message_generator` export, if any.
    pub fn message_generator(&self) -> Option<&str> {
        self.exports_named("message_generator")
            .next()
            .map(|export| export.content.as_str())
    }

    /// Content of the first `build_type` export that applies under `context`.
    pub fn build_type(&self, context: &ConditionContext) -> Option<&str> {
        self.exports_named("build_type")
            .find(|export| export.applies(context))
            .map(|export| export.content.as_str())
    }

    /// Names of the groups this package belongs to under `context`.
    pub fn groups(&self, context: &ConditionContext) -> impl Iterator<Item = &str> {
        self.member_of_groups
            .iter()
            .filter(move |group| group.applies(context))
            .map(|group| group.name.as_str())
    }
}
