use std::fs;
use std::path::Path;

use routespec_build::{BuildError, BuildTransform, HttpMethod, SkipReason};
use tempfile::tempdir;

const ROUTE: &str = r#"use routespec::prelude::*;

pub fn route(registry: &mut Registry) -> anyhow::Result<Pipeline> {
    let def = define_meta(
        registry,
        RouteMeta {
            summary: Some("demo".into()),
            ..RouteMeta::default()
        },
    )?;
    Ok(def.define_event_handler(handler_fn(demo)))
}
"#;

fn write(root: &Path, rel: &str, code: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, code).unwrap();
}

#[test]
fn annotates_tree_into_mirrored_layout() {
    let tmp = tempdir().unwrap();
    let routes = tmp.path().join("routes");
    let out = tmp.path().join("out");
    write(&routes, "index.get.rs", ROUTE);
    write(&routes, "users/[id].patch.rs", ROUTE);
    write(&routes, "api/v1/[...catch].rs", ROUTE);
    write(&routes, "notes.txt", "not a route");

    let report = BuildTransform::new(&routes).transform_tree(&out).unwrap();

    assert_eq!(report.transformed.len(), 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::NotRust);

    let patched = fs::read_to_string(out.join("users/[id].patch.rs")).unwrap();
    assert!(patched.contains("__path: \"/users/{id}\","));
    assert!(patched.contains("__method: \"PATCH\","));

    let catch_all = fs::read_to_string(out.join("api/v1/[...catch].rs")).unwrap();
    assert!(catch_all.contains("__path: \"/api/v1/{*path}\","));

    let index = report
        .transformed
        .iter()
        .find(|t| t.metadata.url_template == "/")
        .unwrap();
    assert_eq!(index.metadata.http_method, HttpMethod::Get);
    assert!(index.changed);
}

#[test]
fn rerunning_over_output_is_a_no_op() {
    let tmp = tempdir().unwrap();
    let routes = tmp.path().join("routes");
    write(&routes, "pages/[page].get.rs", ROUTE);

    let first = tmp.path().join("first");
    BuildTransform::new(&routes).transform_tree(&first).unwrap();

    // feed the annotated files back in as a routes tree of their own
    let second = tmp.path().join("second");
    let report = BuildTransform::new(&first).transform_tree(&second).unwrap();
    assert!(report.transformed.iter().all(|t| !t.changed));

    assert_eq!(
        fs::read_to_string(first.join("pages/[page].get.rs")).unwrap(),
        fs::read_to_string(second.join("pages/[page].get.rs")).unwrap()
    );
}

#[test]
fn unsupported_catch_all_is_skipped_not_written() {
    let tmp = tempdir().unwrap();
    let routes = tmp.path().join("routes");
    let out = tmp.path().join("out");
    write(&routes, "api/[...rest].rs", ROUTE);

    let report = BuildTransform::new(&routes)
        .catch_all_supported(false)
        .transform_tree(&out)
        .unwrap();

    assert!(report.transformed.is_empty());
    assert_eq!(report.skipped[0].reason, SkipReason::CatchAllUnsupported);
    assert!(!out.join("api/[...rest].rs").exists());
}

#[test]
fn invalid_route_aborts_the_pass() {
    let tmp = tempdir().unwrap();
    let routes = tmp.path().join("routes");
    write(&routes, "ok.get.rs", ROUTE);
    write(&routes, "[a]/[a].get.rs", ROUTE);

    let err = BuildTransform::new(&routes)
        .transform_tree(tmp.path().join("out"))
        .unwrap_err();
    assert!(matches!(err, BuildError::DuplicateParameter { .. }));
}
