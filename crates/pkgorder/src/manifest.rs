// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

//! Parsing and writing of `package.xml` manifests.
//!
//! Three manifest formats exist. The `format` attribute of the root
//! `package` element selects which elements are legal; it defaults to 1.
//!
//! ```xml
//! <package format="3">
//!   <name>talker</name>
//!   <version>1.2.0</version>
//!   <description>Publishes greetings</description>
//!   <maintainer email="jane@example.com">Jane Doe</maintainer>
//!   <license>Apache-2.0</license>
//!   <buildtool_depend>ament_cmake</buildtool_depend>
//!   <depend condition="$ROS_VERSION == 2">rclcpp</depend>
//!   <export>
//!     <build_type>ament_cmake</build_type>
//!   </export>
//! </package>
//! ```

use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Document, Element, ParentOfChild};

use crate::condition::Condition;
use crate::error::{ManifestError, ManifestErrorKind};
use crate::package::{
    Dependency, DependencyCategory, Description, Export, Format, GroupDependency,
    GroupMembership, Package, Person, Relation, Url, UrlType, VersionConstraint,
    collapse_whitespace,
};

#[cfg(test)]
#[path = "./manifest_test.rs"]
mod manifest_test;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_]*$").expect("valid name pattern"));

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").expect("valid version pattern"));

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});

/// Parse a manifest document into a validated [`Package`].
///
/// The document is only parsed, never resolved against anything else: no
/// filesystem or network access happens here.
pub fn parse_manifest(document: &str) -> Result<Package, ManifestError> {
    let xml = sxd_document::parser::parse(document).map_err(|err| {
        ManifestError::new(
            None,
            ManifestErrorKind::malformed("package", format!("invalid XML: {err:?}")),
        )
    })?;
    let document = xml.as_document();

    let mut roots = document.root().children().into_iter().filter_map(|child| match child {
        ChildOfRoot::Element(element) => Some(element),
        _ => None,
    });
    let root = match (roots.next(), roots.next()) {
        (Some(root), None) if root.name().local_part() == "package" => root,
        _ => {
            return Err(ManifestError::new(
                None,
                ManifestErrorKind::malformed(
                    "package",
                    "the manifest must contain a single 'package' root element",
                ),
            ));
        }
    };

    let package = ManifestReader::new(root)?.read()?;
    package.validate()?;
    tracing::debug!(
        package = %package.name,
        format = %package.format,
        dependencies = package.dependencies.len(),
        "parsed manifest"
    );
    Ok(package)
}

/// Read and parse a manifest file.
///
/// `path` may point at the manifest itself or at a directory containing a
/// [`crate::MANIFEST_FILENAME`].
pub fn parse_manifest_file<P: AsRef<Path>>(path: P) -> crate::Result<Package> {
    let path = path.as_ref();
    let path = if path.is_dir() {
        path.join(crate::MANIFEST_FILENAME)
    } else {
        path.to_path_buf()
    };
    let document = std::fs::read_to_string(&path).map_err(|error| crate::Error::ReadFailed {
        path: path.clone(),
        error,
    })?;
    parse_manifest(&document).map_err(|error| crate::Error::InvalidManifestFile { path, error })
}

struct ManifestReader<'d> {
    root: Element<'d>,
    format: Format,
    package: Package,
}

impl<'d> ManifestReader<'d> {
    fn new(root: Element<'d>) -> Result<Self, ManifestError> {
        let format = match root.attribute_value("format") {
            None => Format::V1,
            Some(value) => value
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(Format::from_number)
                .ok_or_else(|| {
                    ManifestError::new(
                        None,
                        ManifestErrorKind::UnsupportedFormat {
                            format: value.to_string(),
                        },
                    )
                })?,
        };

        let name = single_child(root, "name", None)?
            .map(element_text)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ManifestError::new(None, ManifestErrorKind::missing("name")))?;

        let mut package = Package::new(name, String::new());
        package.format = format;
        Ok(Self {
            root,
            format,
            package,
        })
    }

    fn error(&self, kind: ManifestErrorKind) -> ManifestError {
        ManifestError::new(Some(self.package.name.as_str()), kind)
    }

    fn read(mut self) -> Result<Package, ManifestError> {
        let package_name = self.package.name.clone();
        let name = Some(package_name.as_str());

        let version = single_child(self.root, "version", name)?
            .ok_or_else(|| self.error(ManifestErrorKind::missing("version")))?;
        self.package.version = element_text(version);
        self.package.version_abi = version.attribute_value("abi").map(ToOwned::to_owned);

        if let Some(description) = single_child(self.root, "description", name)? {
            let raw = inner_xml(description).map_err(|err| {
                self.error(ManifestErrorKind::malformed("description", err.to_string()))
            })?;
            self.package.description = Description {
                raw,
                plain: collapse_whitespace(&descendant_text(description)),
            };
        }

        let mut seen_export = false;
        for element in child_elements(self.root) {
            let tag = element.name().local_part();
            match tag {
                "name" | "version" | "description" => {}
                "maintainer" => {
                    let maintainer = self.read_person(element)?;
                    self.package.maintainers.push(maintainer);
                }
                "author" => {
                    let author = self.read_person(element)?;
                    self.package.authors.push(author);
                }
                "license" => {
                    let license = element_text(element);
                    if license.is_empty() {
                        return Err(self.error(ManifestErrorKind::malformed(
                            "license",
                            "license must not be empty",
                        )));
                    }
                    self.package.licenses.push(license);
                }
                "url" => {
                    let kind = match element.attribute_value("type") {
                        None => UrlType::default(),
                        Some(kind) => kind.parse::<UrlType>().map_err(|reason| {
                            self.error(ManifestErrorKind::malformed("url", reason))
                        })?,
                    };
                    self.package.urls.push(Url {
                        url: element_text(element),
                        kind,
                    });
                }
                "depend" => {
                    if self.format < Format::V2 {
                        return Err(self.forbidden(tag));
                    }
                    for category in [
                        DependencyCategory::Build,
                        DependencyCategory::BuildExport,
                        DependencyCategory::Exec,
                    ] {
                        let dependency = self.read_dependency(element, category)?;
                        self.package.dependencies.push(dependency);
                    }
                }
                "conflict" | "replace" => {
                    let (name, constraint, condition) = self.read_relation(element)?;
                    let relation = Relation {
                        name,
                        constraint,
                        condition,
                    };
                    if tag == "conflict" {
                        self.package.conflicts.push(relation);
                    } else {
                        self.package.replaces.push(relation);
                    }
                }
                "group_depend" | "member_of_group" => {
                    if self.format < Format::V3 {
                        return Err(self.forbidden(tag));
                    }
                    let (name, _, condition) = self.read_relation(element)?;
                    if tag == "group_depend" {
                        self.package
                            .group_depends
                            .push(GroupDependency { name, condition });
                    } else {
                        self.package
                            .member_of_groups
                            .push(GroupMembership { name, condition });
                    }
                }
                "export" => {
                    if seen_export {
                        return Err(self.error(ManifestErrorKind::malformed(
                            "export",
                            "the manifest must not contain more than one 'export' element",
                        )));
                    }
                    seen_export = true;
                    self.package.exports = self.read_exports(element)?;
                }
                other => match DependencyCategory::from_element_name(other) {
                    Some(category) if category.is_legal_in(self.format) => {
                        let dependency = self.read_dependency(element, category)?;
                        self.package.dependencies.push(dependency);
                    }
                    Some(_) => return Err(self.forbidden(other)),
                    None => {
                        tracing::warn!(
                            package = %self.package.name,
                            element = other,
                            "ignoring unknown manifest element"
                        );
                        self.package.unknown_elements.push(other.to_string());
                    }
                },
            }
        }

        Ok(self.package)
    }

    fn forbidden(&self, tag: &str) -> ManifestError {
        self.error(ManifestErrorKind::malformed(
            tag,
            format!("element is not allowed in format {}", self.format),
        ))
    }

    fn read_person(&self, element: Element<'_>) -> Result<Person, ManifestError> {
        let tag = element.name().local_part();
        let name = element_text(element);
        if name.is_empty() {
            return Err(self.error(ManifestErrorKind::malformed(tag, "name must not be empty")));
        }
        Ok(Person::new(name, element.attribute_value("email")))
    }

    fn read_condition(&self, element: Element<'_>) -> Result<Option<Condition>, ManifestError> {
        let Some(expression) = element.attribute_value("condition") else {
            return Ok(None);
        };
        let tag = element.name().local_part();
        if !self.format.supports_conditions() {
            return Err(self.error(ManifestErrorKind::malformed(
                tag,
                format!(
                    "the 'condition' attribute requires format 3, manifest uses format {}",
                    self.format
                ),
            )));
        }
        Condition::parse(expression).map(Some).map_err(|error| {
            self.error(ManifestErrorKind::InvalidCondition {
                element: tag.to_string(),
                error,
            })
        })
    }

    fn read_relation(
        &self,
        element: Element<'_>,
    ) -> Result<(String, VersionConstraint, Option<Condition>), ManifestError> {
        let tag = element.name().local_part();
        let name = element_text(element);
        if name.is_empty() {
            return Err(self.error(ManifestErrorKind::malformed(tag, "name must not be empty")));
        }
        let mut constraint = VersionConstraint::default();
        for attribute in VersionConstraint::ATTRIBUTES {
            if let Some(value) = element.attribute_value(attribute) {
                let value = value.trim();
                if value.is_empty() {
                    return Err(self.error(ManifestErrorKind::malformed(
                        tag,
                        format!("'{attribute}' of '{name}' must not be empty"),
                    )));
                }
                constraint.set(attribute, value.to_string());
            }
        }
        let condition = self.read_condition(element)?;
        Ok((name, constraint, condition))
    }

    fn read_dependency(
        &self,
        element: Element<'_>,
        category: DependencyCategory,
    ) -> Result<Dependency, ManifestError> {
        let (name, constraint, condition) = self.read_relation(element)?;
        Ok(Dependency {
            name,
            category,
            constraint,
            condition,
        })
    }

    fn read_exports(&self, export: Element<'_>) -> Result<Vec<Export>, ManifestError> {
        let mut exports = Vec::new();
        for element in child_elements(export) {
            let mut attributes = IndexMap::new();
            for attribute in element.attributes() {
                let key = attribute.name().local_part();
                if key != "condition" {
                    attributes.insert(key.to_string(), attribute.value().to_string());
                }
            }
            let tag = element.name().local_part();
            let content = inner_xml(element)
                .map_err(|err| self.error(ManifestErrorKind::malformed(tag, err.to_string())))?;
            exports.push(Export {
                tag: tag.to_string(),
                attributes,
                content,
                condition: self.read_condition(element)?,
            });
        }
        Ok(exports)
    }
}

impl Package {
    /// Check the cross-field rules every manifest has to satisfy.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let name = Some(self.name.as_str());
        let fail = |kind| Err(ManifestError::new(name, kind));

        if self.name.is_empty() {
            return fail(ManifestErrorKind::missing("name"));
        }
        if !NAME_PATTERN.is_match(&self.name) {
            return fail(ManifestErrorKind::malformed(
                "name",
                format!("package name '{}' does not follow naming conventions", self.name),
            ));
        }

        if self.version.is_empty() {
            return fail(ManifestErrorKind::missing("version"));
        }
        if !VERSION_PATTERN.is_match(&self.version) {
            return fail(ManifestErrorKind::malformed(
                "version",
                format!(
                    "version '{}' must be three dot-separated integers",
                    self.version
                ),
            ));
        }

        if self.maintainers.is_empty() {
            return fail(ManifestErrorKind::missing("maintainer"));
        }
        for maintainer in &self.maintainers {
            match maintainer.email.as_deref() {
                None => {
                    return fail(ManifestErrorKind::malformed(
                        "maintainer",
                        format!("maintainer '{}' must have an email address", maintainer.name),
                    ));
                }
                Some(email) if !EMAIL_PATTERN.is_match(email) => {
                    return fail(ManifestErrorKind::malformed(
                        "maintainer",
                        format!("invalid email '{email}' for '{}'", maintainer.name),
                    ));
                }
                Some(_) => {}
            }
        }
        for author in &self.authors {
            if let Some(email) = author.email.as_deref() {
                if !EMAIL_PATTERN.is_match(email) {
                    return fail(ManifestErrorKind::malformed(
                        "author",
                        format!("invalid email '{email}' for '{}'", author.name),
                    ));
                }
            }
        }

        if self.licenses.is_empty() {
            return fail(ManifestErrorKind::missing("license"));
        }

        for dependency in &self.dependencies {
            let element = dependency.category.element_name();
            if !dependency.category.is_legal_in(self.format) {
                return fail(ManifestErrorKind::malformed(
                    element,
                    format!("element is not allowed in format {}", self.format),
                ));
            }
            if dependency.name == self.name {
                return fail(ManifestErrorKind::malformed(
                    element,
                    "the package must not depend on itself",
                ));
            }
        }
        for (element, relations) in [("conflict", &self.conflicts), ("replace", &self.replaces)] {
            if relations.iter().any(|relation| relation.name == self.name) {
                return fail(ManifestErrorKind::malformed(
                    element,
                    "the package must not reference itself",
                ));
            }
        }

        if !self.format.supports_conditions() {
            if !self.group_depends.is_empty() {
                return fail(ManifestErrorKind::malformed(
                    "group_depend",
                    format!("element is not allowed in format {}", self.format),
                ));
            }
            if !self.member_of_groups.is_empty() {
                return fail(ManifestErrorKind::malformed(
                    "member_of_group",
                    format!("element is not allowed in format {}", self.format),
                ));
            }
            let conditional = self
                .dependencies
                .iter()
                .find(|dependency| dependency.condition.is_some());
            if let Some(dependency) = conditional {
                return fail(ManifestErrorKind::malformed(
                    dependency.category.element_name(),
                    "the 'condition' attribute requires format 3",
                ));
            }
        }

        Ok(())
    }
}

/// Serialize a package back into a manifest document.
///
/// Parsing the result yields a package equal to the input, except for
/// [`Package::unknown_elements`] which are not carried over.
pub fn write_manifest(package: &Package) -> crate::Result<String> {
    let xml = sxd_document::Package::new();
    let document = xml.as_document();
    let root = document.create_element("package");
    root.set_attribute_value("format", &package.format.to_string());
    document.root().append_child(root);

    let writer = ManifestWriter { document, root };
    writer.child(root, "name", &package.name);
    let version = writer.child(root, "version", &package.version);
    if let Some(abi) = &package.version_abi {
        version.set_attribute_value("abi", abi);
    }
    let description = writer.child(root, "description", "");
    writer.markup(description, &package.description.raw);

    for maintainer in &package.maintainers {
        writer.person(maintainer, "maintainer");
    }
    for license in &package.licenses {
        writer.child(root, "license", license);
    }
    for url in &package.urls {
        writer
            .child(root, "url", &url.url)
            .set_attribute_value("type", url.kind.as_str());
    }
    for author in &package.authors {
        writer.person(author, "author");
    }

    for dependency in &package.dependencies {
        writer.relation(
            dependency.category.element_name(),
            &dependency.name,
            &dependency.constraint,
            dependency.condition.as_ref(),
        );
    }
    for relation in &package.conflicts {
        writer.relation(
            "conflict",
            &relation.name,
            &relation.constraint,
            relation.condition.as_ref(),
        );
    }
    for relation in &package.replaces {
        writer.relation(
            "replace",
            &relation.name,
            &relation.constraint,
            relation.condition.as_ref(),
        );
    }
    for group in &package.group_depends {
        let element = writer.child(root, "group_depend", &group.name);
        set_condition(element, group.condition.as_ref());
    }
    for group in &package.member_of_groups {
        let element = writer.child(root, "member_of_group", &group.name);
        set_condition(element, group.condition.as_ref());
    }

    if !package.exports.is_empty() {
        let exports = writer.child(root, "export", "");
        for export in &package.exports {
            let element = writer.child(exports, &export.tag, "");
            for (key, value) in &export.attributes {
                element.set_attribute_value(key.as_str(), value);
            }
            set_condition(element, export.condition.as_ref());
            writer.markup(element, &export.content);
        }
        writer.close(exports);
    }
    writer.close(root);

    render(&writer.document).map_err(|error| crate::Error::WriteFailed {
        package: package.name.clone(),
        error,
    })
}

/// Builds the element tree of a manifest with one child per line.
struct ManifestWriter<'d> {
    document: Document<'d>,
    root: Element<'d>,
}

impl<'d> ManifestWriter<'d> {
    fn indent(&self, element: Element<'d>) -> String {
        let mut depth = 0;
        let mut current = element;
        while let Some(ParentOfChild::Element(parent)) = current.parent() {
            depth += 1;
            current = parent;
        }
        format!("\n{}", "  ".repeat(depth))
    }

    /// Append a `tag` element holding `text` to `parent`.
    fn child(&self, parent: Element<'d>, tag: &str, text: &str) -> Element<'d> {
        let element = self.document.create_element(tag);
        if !text.is_empty() {
            element.set_text(text);
        }
        let indent = self.indent(parent);
        parent.append_child(self.document.create_text(&format!("{indent}  ")));
        parent.append_child(element);
        element
    }

    /// Put the closing tag of `element` on its own line.
    fn close(&self, element: Element<'d>) {
        let indent = self.indent(element);
        element.append_child(self.document.create_text(&indent));
    }

    /// Append already serialized `markup` to `element`.
    ///
    /// Content that is not well-formed markup is kept as plain text.
    fn markup(&self, element: Element<'d>, markup: &str) {
        if markup.is_empty() {
            return;
        }
        match sxd_document::parser::parse(&format!("<{FRAGMENT}>{markup}</{FRAGMENT}>")) {
            Ok(fragment) => {
                let source = fragment.as_document();
                if let Some(wrapper) = root_element(&source) {
                    copy_children(&self.document, element, wrapper);
                }
            }
            Err(_) => {
                element.set_text(markup);
            }
        }
    }

    fn person(&self, person: &Person, tag: &str) {
        let element = self.child(self.root, tag, &person.name);
        if let Some(email) = &person.email {
            element.set_attribute_value("email", email);
        }
    }

    fn relation(
        &self,
        tag: &str,
        name: &str,
        constraint: &VersionConstraint,
        condition: Option<&Condition>,
    ) {
        let element = self.child(self.root, tag, name);
        for (key, value) in constraint.attributes() {
            element.set_attribute_value(key, value);
        }
        set_condition(element, condition);
    }
}

fn set_condition(element: Element<'_>, condition: Option<&Condition>) {
    if let Some(condition) = condition {
        element.set_attribute_value("condition", condition.as_str());
    }
}

/// Name of the element that wraps markup fragments while they are parsed or
/// rendered on their own.
const FRAGMENT: &str = "fragment";

fn root_element<'d>(document: &Document<'d>) -> Option<Element<'d>> {
    document
        .root()
        .children()
        .into_iter()
        .find_map(|child| match child {
            ChildOfRoot::Element(element) => Some(element),
            _ => None,
        })
}

/// Recreate the children of `source` under `target`, which may belong to
/// another document.
fn copy_children<'d>(document: &Document<'d>, target: Element<'d>, source: Element<'_>) {
    for child in source.children() {
        match child {
            ChildOfElement::Element(element) => {
                let copy = document.create_element(element.name().local_part());
                for attribute in element.attributes() {
                    copy.set_attribute_value(attribute.name().local_part(), attribute.value());
                }
                copy_children(document, copy, element);
                target.append_child(copy);
            }
            ChildOfElement::Text(text) => target.append_child(document.create_text(text.text())),
            ChildOfElement::Comment(comment) => {
                target.append_child(document.create_comment(comment.text()))
            }
            ChildOfElement::ProcessingInstruction(pi) => target.append_child(
                document.create_processing_instruction(pi.target(), pi.value()),
            ),
        }
    }
}

fn render(document: &Document<'_>) -> std::io::Result<String> {
    let mut out = Vec::new();
    sxd_document::writer::format_document(document, &mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn child_elements(parent: Element<'_>) -> impl Iterator<Item = Element<'_>> {
    parent.children().into_iter().filter_map(|child| match child {
        ChildOfElement::Element(element) => Some(element),
        _ => None,
    })
}

/// The only child element named `tag`; more than one is an error.
fn single_child<'d>(
    parent: Element<'d>,
    tag: &str,
    package: Option<&str>,
) -> Result<Option<Element<'d>>, ManifestError> {
    let mut matches = child_elements(parent).filter(|element| element.name().local_part() == tag);
    let first = matches.next();
    if matches.next().is_some() {
        return Err(ManifestError::new(
            package,
            ManifestErrorKind::malformed(
                tag,
                format!("the manifest must contain exactly one '{tag}' element"),
            ),
        ));
    }
    Ok(first)
}

/// Concatenated direct text children, trimmed.
fn element_text(element: Element<'_>) -> String {
    let mut text = String::new();
    for child in element.children() {
        if let ChildOfElement::Text(node) = child {
            text.push_str(node.text());
        }
    }
    text.trim().to_string()
}

fn descendant_text(element: Element<'_>) -> String {
    let mut text = String::new();
    for child in element.children() {
        match child {
            ChildOfElement::Text(node) => text.push_str(node.text()),
            ChildOfElement::Element(inner) => {
                text.push(' ');
                text.push_str(&descendant_text(inner));
                text.push(' ');
            }
            _ => {}
        }
    }
    text
}

/// The children of `element` rendered back to markup, trimmed.
fn inner_xml(element: Element<'_>) -> std::io::Result<String> {
    let fragment = sxd_document::Package::new();
    let document = fragment.as_document();
    let wrapper = document.create_element(FRAGMENT);
    document.root().append_child(wrapper);
    copy_children(&document, wrapper, element);

    let rendered = render(&document)?;
    let open = format!("<{FRAGMENT}>");
    let close = format!("</{FRAGMENT}>");
    let inner = match (rendered.find(&open), rendered.rfind(&close)) {
        (Some(start), Some(end)) if start + open.len() <= end => &rendered[start + open.len()..end],
        // an empty wrapper renders self-closed
        _ => "",
    };
    Ok(inner.trim().to_string())
}
