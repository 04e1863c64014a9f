// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use tempfile::TempDir;

use super::*;
use crate::context::ConditionContext;

const FORMAT_1: &str = r#"<?xml version="1.0"?>
<package>
  <name>roscpp_tutorials</name>
  <version>0.6.1</version>
  <description>Tutorials for <b>roscpp</b>.</description>
  <maintainer email="dthomas@example.org">Dirk Thomas</maintainer>
  <license>BSD</license>
  <url>http://www.ros.org/wiki/roscpp_tutorials</url>
  <author>Morgan Quigley</author>
  <buildtool_depend>catkin</buildtool_depend>
  <build_depend version_gte="1.9.0">roscpp</build_depend>
  <run_depend>roscpp</run_depend>
  <test_depend>rostest</test_depend>
  <export>
    <metapackage/>
  </export>
</package>
"#;

const FORMAT_3: &str = r#"<?xml version="1.0"?>
<package format="3">
  <name>talker</name>
  <version abi="1.2">1.2.0</version>
  <description>
    Publishes   greetings
  </description>
  <maintainer email="jane@example.com">Jane Doe</maintainer>
  <license>Apache-2.0</license>
  <license>MIT</license>
  <url type="repository">https://example.com/talker.git</url>
  <url type="bugtracker">https://example.com/talker/issues</url>
  <author email="john@example.com">John Roe</author>
  <buildtool_depend condition="$ROS_VERSION == 1">catkin</buildtool_depend>
  <buildtool_depend condition="$ROS_VERSION == 2">ament_cmake</buildtool_depend>
  <depend>std_msgs</depend>
  <exec_depend version_lt="3.0.0">launch</exec_depend>
  <test_depend>ament_lint_auto</test_depend>
  <conflict>old_talker</conflict>
  <replace>legacy_talker</replace>
  <group_depend>rosidl_interface_packages</group_depend>
  <member_of_group condition="$ROS_VERSION == 2">demo_packages</member_of_group>
  <export>
    <build_type condition="$ROS_VERSION == 1">catkin</build_type>
    <build_type condition="$ROS_VERSION == 2">ament_cmake</build_type>
    <rviz plugin="${prefix}/plugin_description.xml"/>
  </export>
</package>
"#;

fn minimal(format: u32, body: &str) -> String {
    format!(
        r#"<package format="{format}">
  <name>pkg</name>
  <version>1.0.0</version>
  <description>test</description>
  <maintainer email="m@example.com">M</maintainer>
  <license>BSD</license>
  {body}
</package>"#
    )
}

#[rstest]
fn test_parse_format_1() {
    let package = parse_manifest(FORMAT_1).expect("Should parse format 1 manifest");

    assert_eq!(package.format, Format::V1);
    assert_eq!(package.name, "roscpp_tutorials");
    assert_eq!(package.version, "0.6.1");
    assert_eq!(package.description.raw, "Tutorials for <b>roscpp</b>.");
    assert_eq!(package.description.plain, "Tutorials for roscpp .");
    assert_eq!(package.maintainers[0].to_string(), "Dirk Thomas <dthomas@example.org>");
    assert_eq!(package.licenses, vec!["BSD"]);
    assert_eq!(package.urls[0].kind, UrlType::Website);
    assert_eq!(package.authors[0].email, None);
    assert!(package.is_metapackage());

    let categories: Vec<_> = package
        .dependencies
        .iter()
        .map(|dep| (dep.name.as_str(), dep.category))
        .collect();
    assert_eq!(
        categories,
        vec![
            ("catkin", DependencyCategory::BuildTool),
            ("roscpp", DependencyCategory::Build),
            ("roscpp", DependencyCategory::Run),
            ("rostest", DependencyCategory::Test),
        ]
    );
    assert_eq!(package.dependencies[1].constraint.gte.as_deref(), Some("1.9.0"));
}

#[rstest]
fn test_parse_format_3() {
    let package = parse_manifest(FORMAT_3).expect("Should parse format 3 manifest");

    assert_eq!(package.format, Format::V3);
    assert_eq!(package.version_abi.as_deref(), Some("1.2"));
    assert_eq!(package.description.plain, "Publishes greetings");
    assert_eq!(package.licenses, vec!["Apache-2.0", "MIT"]);
    assert_eq!(package.urls[0].kind, UrlType::Repository);
    assert_eq!(package.urls[1].kind, UrlType::Bugtracker);
    assert_eq!(package.conflicts[0].name, "old_talker");
    assert_eq!(package.replaces[0].name, "legacy_talker");
    assert_eq!(package.group_depends[0].name, "rosidl_interface_packages");
    assert!(package.unknown_elements.is_empty());

    // `depend` expands into build, build_export and exec
    let std_msgs: Vec<_> = package
        .dependencies
        .iter()
        .filter(|dep| dep.name == "std_msgs")
        .map(|dep| dep.category)
        .collect();
    assert_eq!(
        std_msgs,
        vec![
            DependencyCategory::Build,
            DependencyCategory::BuildExport,
            DependencyCategory::Exec,
        ]
    );

    let ros1 = ConditionContext::new().with("ROS_VERSION", "1");
    let ros2 = ConditionContext::new().with("ROS_VERSION", "2");
    assert_eq!(package.build_type(&ros1), Some("catkin"));
    assert_eq!(package.build_type(&ros2), Some("ament_cmake"));
    assert_eq!(package.groups(&ros1).count(), 0);
    assert_eq!(package.groups(&ros2).collect::<Vec<_>>(), vec!["demo_packages"]);

    let rviz = package.exports_named("rviz").next().unwrap();
    assert_eq!(
        rviz.attributes.get("plugin").map(String::as_str),
        Some("${prefix}/plugin_description.xml")
    );
    assert!(rviz.content.is_empty());
    // the condition attribute is not kept as a plain attribute
    assert!(package.exports[0].attributes.is_empty());
}

#[rstest]
fn test_condition_is_parsed_not_evaluated() {
    let package = parse_manifest(FORMAT_3).unwrap();
    let buildtools: Vec<_> = package
        .dependencies_of(DependencyCategory::BuildTool)
        .collect();

    assert_eq!(buildtools.len(), 2);
    assert_eq!(
        buildtools[0].condition.as_ref().map(|c| c.as_str()),
        Some("$ROS_VERSION == 1")
    );
    let ros2 = ConditionContext::new().with("ROS_VERSION", "2");
    assert!(!buildtools[0].applies(&ros2));
    assert!(buildtools[1].applies(&ros2));
}

#[rstest]
#[case("0")]
#[case("4")]
#[case("two")]
fn test_unsupported_format(#[case] format: &str) {
    let document = minimal(1, "").replace("format=\"1\"", &format!("format=\"{format}\""));
    let err = parse_manifest(&document).expect_err("Should reject format");
    assert_eq!(
        err.kind,
        ManifestErrorKind::UnsupportedFormat {
            format: format.to_string()
        }
    );
}

#[rstest]
#[case("name", "<name>pkg</name>")]
#[case("version", "<version>1.0.0</version>")]
#[case("maintainer", r#"<maintainer email="m@example.com">M</maintainer>"#)]
#[case("license", "<license>BSD</license>")]
fn test_missing_required_field(#[case] field: &str, #[case] element: &str) {
    let document = minimal(2, "").replace(element, "");
    let err = parse_manifest(&document).expect_err("Should reject missing field");
    assert_eq!(err.kind, ManifestErrorKind::missing(field));
    assert_eq!(err.element(), field);
}

#[rstest]
fn test_missing_field_names_package() {
    let document = minimal(2, "").replace("<license>BSD</license>", "");
    let err = parse_manifest(&document).unwrap_err();
    assert_eq!(err.package.as_deref(), Some("pkg"));
    assert!(err.to_string().contains("'pkg'"), "{err}");
}

#[rstest]
fn test_invalid_condition_fails_immediately() {
    let document = minimal(3, r#"<depend condition="$ROS_VERSION == ">rclcpp</depend>"#);
    let err = parse_manifest(&document).expect_err("Should reject invalid condition");
    match err.kind {
        ManifestErrorKind::InvalidCondition { element, .. } => assert_eq!(element, "depend"),
        other => panic!("unexpected error kind {other:?}"),
    }
}

#[rstest]
#[case(1, "<depend>a</depend>", "depend")]
#[case(1, "<exec_depend>a</exec_depend>", "exec_depend")]
#[case(2, "<run_depend>a</run_depend>", "run_depend")]
#[case(2, "<group_depend>g</group_depend>", "group_depend")]
#[case(2, r#"<build_depend condition="$A == b">a</build_depend>"#, "build_depend")]
#[case(3, "<build_depend>pkg</build_depend>", "build_depend")]
#[case(3, "<url type=\"wiki\">http://x</url>", "url")]
#[case(3, "<export/><export/>", "export")]
#[case(3, "<name>other</name>", "name")]
fn test_malformed_element(#[case] format: u32, #[case] body: &str, #[case] element: &str) {
    let err = parse_manifest(&minimal(format, body)).expect_err("Should reject element");
    assert!(
        matches!(err.kind, ManifestErrorKind::MalformedElement { .. }),
        "{err:?}"
    );
    assert_eq!(err.element(), element);
}

#[rstest]
#[case("<name>pkg</name>", "<name>pkg-name</name>", "name")]
#[case("<version>1.0.0</version>", "<version>1.0</version>", "version")]
#[case(
    r#"<maintainer email="m@example.com">M</maintainer>"#,
    "<maintainer>M</maintainer>",
    "maintainer"
)]
#[case(
    r#"<maintainer email="m@example.com">M</maintainer>"#,
    r#"<maintainer email="not-an-email">M</maintainer>"#,
    "maintainer"
)]
fn test_invalid_identity(#[case] from: &str, #[case] to: &str, #[case] element: &str) {
    let document = minimal(2, "").replace(from, to);
    let err = parse_manifest(&document).expect_err("Should reject identity");
    assert!(
        matches!(err.kind, ManifestErrorKind::MalformedElement { .. }),
        "{err:?}"
    );
    assert_eq!(err.element(), element);
}

#[rstest]
fn test_unknown_elements_are_recorded() {
    let package = parse_manifest(&minimal(3, "<icon>logo.png</icon>")).unwrap();
    assert_eq!(package.unknown_elements, vec!["icon"]);
}

#[rstest]
fn test_invalid_xml() {
    let err = parse_manifest("<package><name>pkg</package>").unwrap_err();
    assert_eq!(err.element(), "package");
    assert_eq!(err.package, None);
}

#[rstest]
fn test_wrong_root_element() {
    let err = parse_manifest("<manifest><name>pkg</name></manifest>").unwrap_err();
    assert_eq!(err.element(), "package");
}

#[rstest]
#[case(FORMAT_1)]
#[case(FORMAT_3)]
fn test_write_round_trip(#[case] document: &str) {
    let package = parse_manifest(document).unwrap();
    let written = write_manifest(&package).expect("Should write manifest");
    let reparsed = parse_manifest(&written).expect("Should parse written manifest");
    assert_eq!(reparsed, package);
}

#[rstest]
fn test_write_escapes_text() {
    let mut package = parse_manifest(&minimal(2, "")).unwrap();
    package.licenses = vec!["Apache <2.0> & MIT".to_string()];
    package.authors = vec![Person::new("A \"Quoted\" <Author>", Some("a@example.com"))];
    let written = write_manifest(&package).unwrap();
    assert!(written.contains("&lt;2.0"), "{written}");
    assert!(written.contains("&amp; MIT"), "{written}");

    let reparsed = parse_manifest(&written).unwrap();
    assert_eq!(reparsed.licenses, package.licenses);
    assert_eq!(reparsed.authors, package.authors);
}

#[rstest]
fn test_write_keeps_markup() {
    let package = parse_manifest(&minimal(
        2,
        r#"<export><architecture_independent/><plugin kind="a &amp; b">x<!-- note --></plugin></export>"#,
    ))
    .unwrap();
    let written = write_manifest(&package).unwrap();
    assert!(written.contains("<name>pkg</name>"), "{written}");

    let reparsed = parse_manifest(&written).unwrap();
    assert_eq!(reparsed.exports, package.exports);
    assert_eq!(reparsed.exports[1].attributes["kind"], "a & b");
    assert!(reparsed.exports[1].content.contains("note"));
}

#[rstest]
fn test_write_plain_description() {
    let mut package = parse_manifest(&minimal(2, "")).unwrap();
    package.description = Description::from_plain("Compares a < b");
    let written = write_manifest(&package).unwrap();

    let reparsed = parse_manifest(&written).expect("Should parse written manifest");
    assert_eq!(reparsed.description.plain, "Compares a < b");
}

#[rstest]
fn test_parse_manifest_file_from_directory() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join(crate::MANIFEST_FILENAME), minimal(2, "")).unwrap();

    let package = parse_manifest_file(tmp.path()).expect("Should parse from directory");
    assert_eq!(package.name, "pkg");
}

#[rstest]
fn test_parse_manifest_file_reports_path() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("package.xml");
    std::fs::write(&path, minimal(2, "").replace("<license>BSD</license>", "")).unwrap();

    match parse_manifest_file(&path) {
        Err(crate::Error::InvalidManifestFile { path: reported, error }) => {
            assert_eq!(reported, path);
            assert_eq!(error.element(), "license");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[rstest]
fn test_parse_manifest_file_missing() {
    let tmp = TempDir::new().unwrap();
    let result = parse_manifest_file(tmp.path().join("missing.xml"));
    assert!(matches!(result, Err(crate::Error::ReadFailed { .. })));
}
