// Copyright (c) Contributors to the pkgorder project.
// SPDX-License-Identifier: Apache-2.0

use rstest::{fixture, rstest};

use super::*;
use crate::condition::Condition;
use crate::package::{Dependency, Export, GroupDependency, GroupMembership, Package};
use crate::registry::build_registry;

fn package(name: &str, build: &[&str]) -> Package {
    build.iter().fold(Package::new(name, "1.0.0"), |package, dep| {
        package.with_dependency(Dependency::new(*dep, DependencyCategory::Build))
    })
}

fn registry_of(packages: Vec<Package>) -> Registry {
    build_registry(
        packages
            .into_iter()
            .map(|package| {
                let location = format!("/ws/src/{}", package.name);
                (package, location)
            }),
    )
    .expect("Should build registry")
}

#[fixture]
fn build_categories() -> BTreeSet<DependencyCategory> {
    DependencyCategory::BUILD_ORDER.into_iter().collect()
}

#[rstest]
fn test_edges_and_externals(build_categories: BTreeSet<DependencyCategory>) {
    let registry = registry_of(vec![
        package("app", &["lib", "cmake"]),
        package("lib", &["cmake"]),
    ]);

    let graph = build_graph(&registry, &build_categories, &ConditionContext::new()).unwrap();

    assert_eq!(graph.packages().collect::<Vec<_>>(), vec!["app", "lib"]);
    assert_eq!(graph.externals().collect::<Vec<_>>(), vec!["cmake"]);
    assert!(graph.is_external("cmake"));
    assert!(!graph.is_package("cmake"));
    assert_eq!(graph.dependencies("app").collect::<Vec<_>>(), vec!["cmake", "lib"]);
    assert_eq!(graph.package_dependencies("app").collect::<Vec<_>>(), vec!["lib"]);
    assert_eq!(graph.dependencies("cmake").count(), 0);
    assert_eq!(graph.dependents("cmake"), vec!["app", "lib"]);
    assert_eq!(graph.edge_count(), 3);
    assert_eq!(graph.node_count(), 3);
}

#[rstest]
fn test_categories_outside_selection_are_ignored(build_categories: BTreeSet<DependencyCategory>) {
    let app = Package::new("app", "1.0.0")
        .with_dependency(Dependency::new("lib", DependencyCategory::Exec))
        .with_dependency(Dependency::new("gtest", DependencyCategory::Test));
    let registry = registry_of(vec![app, package("lib", &[])]);

    let graph = build_graph(&registry, &build_categories, &ConditionContext::new()).unwrap();
    assert_eq!(graph.edge_count(), 0);
    assert!(!graph.contains("gtest"));

    let exec: BTreeSet<_> = [DependencyCategory::Exec].into_iter().collect();
    let graph = build_graph(&registry, &exec, &ConditionContext::new()).unwrap();
    assert_eq!(graph.dependencies("app").collect::<Vec<_>>(), vec!["lib"]);
    assert_eq!(
        graph.edge_categories("app", "lib"),
        Some(&BTreeSet::from([DependencyCategory::Exec]))
    );
    assert_eq!(graph.edges(), vec![("app", "lib")]);
}

#[rstest]
#[case("1", vec!["ros1_bridge_dep"])]
#[case("2", vec!["rclcpp"])]
fn test_conditional_dependencies(
    build_categories: BTreeSet<DependencyCategory>,
    #[case] version: &str,
    #[case] expected: Vec<&str>,
) {
    let app = Package::new("app", "1.0.0")
        .with_dependency(
            Dependency::new("ros1_bridge_dep", DependencyCategory::Build)
                .with_condition(Condition::parse("$ROS_VERSION == 1").unwrap()),
        )
        .with_dependency(
            Dependency::new("rclcpp", DependencyCategory::Build)
                .with_condition(Condition::parse("$ROS_VERSION == 2").unwrap()),
        );
    let registry = registry_of(vec![app]);
    let context = ConditionContext::new().with("ROS_VERSION", version);

    let graph = build_graph(&registry, &build_categories, &context).unwrap();
    assert_eq!(graph.dependencies("app").collect::<Vec<_>>(), expected);
}

#[rstest]
fn test_self_dependency_is_rejected(build_categories: BTreeSet<DependencyCategory>) {
    let registry = registry_of(vec![package("loop", &["loop"])]);

    let err = build_graph(&registry, &build_categories, &ConditionContext::new())
        .expect_err("Self dependency should fail");
    assert_eq!(
        err,
        GraphError::SelfDependency {
            package: "loop".to_string(),
            category: "build".to_string(),
        }
    );
}

#[rstest]
fn test_group_dependencies_expand_to_members(build_categories: BTreeSet<DependencyCategory>) {
    let mut consumer = package("consumer", &[]);
    consumer.group_depends.push(GroupDependency {
        name: "interfaces".to_string(),
        condition: None,
    });
    consumer.member_of_groups.push(GroupMembership {
        name: "interfaces".to_string(),
        condition: None,
    });
    let mut msgs = package("msgs", &[]);
    msgs.member_of_groups.push(GroupMembership {
        name: "interfaces".to_string(),
        condition: None,
    });
    let mut srvs = package("srvs", &[]);
    srvs.member_of_groups.push(GroupMembership {
        name: "interfaces".to_string(),
        condition: Some(Condition::parse("$ROS_VERSION == 2").unwrap()),
    });
    let registry = registry_of(vec![consumer, msgs, srvs]);

    let ros1 = ConditionContext::new().with("ROS_VERSION", "1");
    let graph = build_graph(&registry, &build_categories, &ros1).unwrap();
    assert_eq!(graph.dependencies("consumer").collect::<Vec<_>>(), vec!["msgs"]);

    let ros2 = ConditionContext::new().with("ROS_VERSION", "2");
    let graph = build_graph(&registry, &build_categories, &ros2).unwrap();
    assert_eq!(
        graph.dependencies("consumer").collect::<Vec<_>>(),
        vec!["msgs", "srvs"]
    );

    let docs: BTreeSet<_> = [DependencyCategory::Doc].into_iter().collect();
    let graph = build_graph(&registry, &docs, &ros2).unwrap();
    assert_eq!(graph.edge_count(), 0);
}

#[rstest]
fn test_transitive_dependencies(build_categories: BTreeSet<DependencyCategory>) {
    let registry = registry_of(vec![
        package("a", &["b", "ext"]),
        package("b", &["c"]),
        package("c", &[]),
        package("d", &[]),
    ]);
    let graph = build_graph(&registry, &build_categories, &ConditionContext::new()).unwrap();

    let deps: Vec<&str> = graph.transitive_dependencies("a").into_iter().collect();
    assert_eq!(deps, vec!["b", "c"]);
    assert!(graph.transitive_dependencies("d").is_empty());
}

#[rstest]
fn test_filter_turns_dropped_packages_external(build_categories: BTreeSet<DependencyCategory>) {
    let registry = registry_of(vec![
        package("a", &["b"]),
        package("b", &["c"]),
        package("c", &[]),
    ]);
    let graph = build_graph(&registry, &build_categories, &ConditionContext::new()).unwrap();

    let filtered = graph.filter(|name| name != "b");
    assert_eq!(filtered.packages().collect::<Vec<_>>(), vec!["a", "c"]);
    assert!(filtered.is_external("b"));
    assert_eq!(filtered.dependencies("b").count(), 0);
    assert_eq!(filtered.dependencies("a").collect::<Vec<_>>(), vec!["b"]);

    // the original graph is untouched
    assert!(graph.is_package("b"));
    assert_eq!(graph.edge_count(), 2);
}

fn with_deps(name: &str, deps: &[(&str, DependencyCategory)]) -> Package {
    deps.iter().fold(Package::new(name, "1.0.0"), |package, (dep, category)| {
        package.with_dependency(Dependency::new(*dep, *category))
    })
}

#[rstest]
fn test_run_dependencies_pass_to_build_dependents(
    build_categories: BTreeSet<DependencyCategory>,
) {
    let registry = registry_of(vec![
        with_deps("x", &[("y", DependencyCategory::Run)]),
        with_deps("y", &[("x", DependencyCategory::Run), ("boost", DependencyCategory::Run)]),
        with_deps("z", &[("x", DependencyCategory::Build)]),
    ]);

    let graph = build_graph(&registry, &build_categories, &ConditionContext::new()).unwrap();
    // mutual run dependencies do not constrain x and y themselves
    assert_eq!(graph.dependencies("x").count(), 0);
    assert_eq!(graph.dependencies("y").count(), 0);
    assert_eq!(graph.dependencies("z").collect::<Vec<_>>(), vec!["x", "y"]);
    assert_eq!(
        graph.edge_categories("z", "y"),
        Some(&BTreeSet::from([DependencyCategory::Run]))
    );
    // external run dependencies are not passed on
    assert!(!graph.contains("boost"));
}

#[rstest]
fn test_exported_dependencies_pass_to_build_dependents(
    build_categories: BTreeSet<DependencyCategory>,
) {
    let registry = registry_of(vec![
        with_deps(
            "app",
            &[
                ("lib", DependencyCategory::Build),
                ("lib", DependencyCategory::Exec),
            ],
        ),
        with_deps(
            "lib",
            &[
                ("headers", DependencyCategory::BuildExport),
                ("runtime", DependencyCategory::Exec),
                ("fixtures", DependencyCategory::Test),
            ],
        ),
        with_deps("headers", &[("generator", DependencyCategory::BuildToolExport)]),
        package("runtime", &[]),
        package("generator", &[]),
        package("fixtures", &[]),
    ]);

    let graph = build_graph(&registry, &build_categories, &ConditionContext::new()).unwrap();
    assert_eq!(
        graph.dependencies("app").collect::<Vec<_>>(),
        vec!["generator", "headers", "lib", "runtime"]
    );
    assert_eq!(graph.dependencies("lib").count(), 0);
    assert_eq!(graph.dependencies("headers").count(), 0);
}

#[rstest]
fn test_run_dependency_back_to_dependent_is_a_self_edge(
    build_categories: BTreeSet<DependencyCategory>,
) {
    let registry = registry_of(vec![
        package("a", &["b"]),
        with_deps("b", &[("a", DependencyCategory::Run)]),
    ]);

    let graph = build_graph(&registry, &build_categories, &ConditionContext::new()).unwrap();
    assert_eq!(graph.edges(), vec![("a", "a"), ("a", "b")]);
}

#[rstest]
fn test_message_generators_are_flagged(build_categories: BTreeSet<DependencyCategory>) {
    let mut gencpp = package("gencpp", &[]);
    gencpp.exports.push(Export::new("message_generator", "cpp"));
    let registry = registry_of(vec![gencpp, package("app", &["gencpp", "ext"])]);

    let graph = build_graph(&registry, &build_categories, &ConditionContext::new()).unwrap();
    assert!(graph.is_message_generator("gencpp"));
    assert!(!graph.is_message_generator("app"));
    assert!(!graph.is_message_generator("ext"));

    let filtered = graph.filter(|name| name == "gencpp");
    assert!(filtered.is_message_generator("gencpp"));
}
