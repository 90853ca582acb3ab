//! Rule file runtime tests

mod helpers;

use helpers::{create_test_catalog, store_physical};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use wkmp_common::catalog::vocabulary::upnp_class;
use wkmp_common::catalog::MetaField;
use wkmp_common::config::{LayoutConfig, LayoutKind};
use wkmp_common::{CatalogObject, ROOT_CONTAINER_ID};
use wkmp_vl::runtime::{self, RuleError, RuleSetRuntime};
use wkmp_vl::{Classifier, RuntimeFault, SessionError, SessionState};

fn photo(location: &str, date: Option<&str>) -> CatalogObject {
    let mut obj = CatalogObject::new_item();
    obj.parent_id = ROOT_CONTAINER_ID;
    obj.title = "file.jpg".to_string();
    obj.class = upnp_class::IMAGE_ITEM.to_string();
    obj.location = PathBuf::from(location);
    if let Some(date) = date {
        obj.set_meta(MetaField::Date, date);
    }
    if let Some(item) = obj.item_mut() {
        item.mime_type = "image/jpeg".to_string();
    }
    obj
}

const PHOTO_RULES: &str = r#"
name = "photos"

[[rule]]
mime = "image/*"
chain = ["Pictures", "Date", "{year:dc:date}", "{month:dc:date}"]

[[rule]]
mime = "image/*"
chain = ["Pictures", "Directories", "{dirs}"]
title = "{field:title} ({year:dc:date|undated})"
"#;

#[tokio::test]
async fn test_photo_rules() {
    let (_dir, catalog) = create_test_catalog().await;
    let source = store_physical(&catalog, photo("/path/to/file.jpg", Some("2021-02-18"))).await;

    let runtime = RuleSetRuntime::parse(PHOTO_RULES).unwrap();
    let classifier = Classifier::new(Box::new(runtime), catalog.clone());

    let report = classifier.process_object(&source, "/path").await;
    assert_eq!(report.placements, 2);

    assert!(catalog.container_by_path("/Pictures/Date/2021/02").await.unwrap().is_some());
    let dir = catalog
        .container_by_path("/Pictures/Directories/to")
        .await
        .unwrap()
        .unwrap();
    let child = catalog.children_of(dir).await.unwrap()[0];
    let child = catalog.load_object(child).await.unwrap().unwrap();
    assert_eq!(child.title, "file.jpg (2021)");
}

#[tokio::test]
async fn test_missing_value_skips_rule() {
    let (_dir, catalog) = create_test_catalog().await;
    let source = store_physical(&catalog, photo("/path/to/file.jpg", None)).await;

    let runtime = RuleSetRuntime::parse(PHOTO_RULES).unwrap();
    let classifier = Classifier::new(Box::new(runtime), catalog.clone());

    let report = classifier.process_object(&source, "/path").await;
    assert_eq!(report.state, SessionState::Idle);
    assert_eq!(report.placements, 1);
    assert!(catalog.container_by_path("/Pictures/Date").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stop_ends_evaluation() {
    let (_dir, catalog) = create_test_catalog().await;
    let source = store_physical(&catalog, photo("/path/to/file.jpg", Some("2021-02-18"))).await;

    let rules = r#"
        [[rule]]
        mime = "image/jpeg"
        chain = ["Pictures", "JPEG"]
        stop = true

        [[rule]]
        mime = "*"
        chain = ["Everything"]
    "#;
    let classifier = Classifier::new(
        Box::new(RuleSetRuntime::parse(rules).unwrap()),
        catalog.clone(),
    );

    assert_eq!(classifier.placement_count(&source, "/path").await, 1);
    assert!(catalog.container_by_path("/Everything").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_namespace_is_runtime_fault() {
    let (_dir, catalog) = create_test_catalog().await;
    let source = store_physical(&catalog, photo("/path/to/file.jpg", Some("2021-02-18"))).await;

    let rules = r#"
        [[rule]]
        mime = "image/*"
        chain = ["Pictures", "All"]

        [[rule]]
        mime = "image/*"
        chain = ["Pictures", "{exif:Model}"]
    "#;
    let classifier = Classifier::new(
        Box::new(RuleSetRuntime::parse(rules).unwrap()),
        catalog.clone(),
    );

    let report = classifier.process_object(&source, "/path").await;
    assert_eq!(report.state, SessionState::Failed);
    assert_eq!(report.placements, 1);
    match report.error {
        Some(SessionError::Runtime(RuntimeFault::Rule { message, .. })) => {
            assert!(message.contains("exif"), "unexpected message: {}", message);
        }
        other => panic!("expected rule fault, got {:?}", other),
    }
}

#[tokio::test]
async fn test_class_prefix_filter() {
    let (_dir, catalog) = create_test_catalog().await;
    let source = store_physical(&catalog, photo("/path/to/file.jpg", None)).await;

    let rules = r#"
        [[rule]]
        mime = "*"
        class_prefix = "object.item.audioItem"
        chain = ["Audio"]

        [[rule]]
        mime = "*"
        class_prefix = "object.item.imageItem"
        chain = ["Pictures"]
    "#;
    let classifier = Classifier::new(
        Box::new(RuleSetRuntime::parse(rules).unwrap()),
        catalog.clone(),
    );

    assert_eq!(classifier.placement_count(&source, "/path").await, 1);
    assert!(catalog.container_by_path("/Pictures").await.unwrap().is_some());
    assert!(catalog.container_by_path("/Audio").await.unwrap().is_none());
}

#[tokio::test]
async fn test_container_only_rule_places_nothing() {
    let (_dir, catalog) = create_test_catalog().await;
    let source = store_physical(&catalog, photo("/path/to/file.jpg", Some("2021-02-18"))).await;

    let rules = r#"
        [[rule]]
        mime = "image/*"
        chain = ["Pictures", "Year", "{year:M_DATE}"]
        class = "UPNP_CLASS_CONTAINER"
        place = false
        log = "Year container for {field:title}"
    "#;
    let classifier = Classifier::new(
        Box::new(RuleSetRuntime::parse(rules).unwrap()),
        catalog.clone(),
    );

    let report = classifier.process_object(&source, "/path").await;
    assert_eq!(report.state, SessionState::Idle);
    assert_eq!(report.placements, 0);

    let leaf = catalog
        .container_by_path("/Pictures/Year/2021")
        .await
        .unwrap()
        .expect("container tree missing");
    assert!(catalog.children_of(leaf).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_metadata_edits_apply_to_the_copy_only() {
    let (_dir, catalog) = create_test_catalog().await;
    let source = store_physical(&catalog, photo("/path/to/file.jpg", Some("2021-02-18"))).await;

    let rules = r#"
        [[rule]]
        mime = "image/*"
        object_type = "OBJECT_TYPE_ITEM"
        chain = ["Pictures", "Edited"]

        [rule.meta]
        M_TITLE = "Photo from {year:M_DATE}"

        [[rule]]
        mime = "image/*"
        chain = ["Pictures", "Plain"]
    "#;
    let classifier = Classifier::new(
        Box::new(RuleSetRuntime::parse(rules).unwrap()),
        catalog.clone(),
    );
    assert_eq!(classifier.placement_count(&source, "/path").await, 2);

    let first_child = |path: &'static str| {
        let catalog = catalog.clone();
        async move {
            let dir = catalog.container_by_path(path).await.unwrap().unwrap();
            let id = catalog.children_of(dir).await.unwrap()[0];
            catalog.load_object(id).await.unwrap().unwrap()
        }
    };

    let edited = first_child("/Pictures/Edited").await;
    assert_eq!(edited.meta(MetaField::Title), Some("Photo from 2021"));

    let plain = first_child("/Pictures/Plain").await;
    assert_eq!(plain.meta(MetaField::Title), None);

    let stored = catalog.load_object(source.id).await.unwrap().unwrap();
    assert_eq!(stored.meta(MetaField::Title), None);
}

#[tokio::test]
async fn test_object_type_filter() {
    let (_dir, catalog) = create_test_catalog().await;
    let source = store_physical(&catalog, photo("/path/to/file.jpg", None)).await;

    let rules = r#"
        [[rule]]
        mime = "*"
        object_type = "OBJECT_TYPE_CONTAINER"
        chain = ["Containers"]
    "#;
    let classifier = Classifier::new(
        Box::new(RuleSetRuntime::parse(rules).unwrap()),
        catalog.clone(),
    );

    assert_eq!(classifier.placement_count(&source, "/path").await, 0);
    assert!(catalog.container_by_path("/Containers").await.unwrap().is_none());
}

#[tokio::test]
async fn test_bad_log_template_is_runtime_fault() {
    let (_dir, catalog) = create_test_catalog().await;
    let source = store_physical(&catalog, photo("/path/to/file.jpg", None)).await;

    let rules = r#"
        [[rule]]
        mime = "image/*"
        chain = ["Pictures"]
        log = "camera {exif:Model}"
    "#;
    let classifier = Classifier::new(
        Box::new(RuleSetRuntime::parse(rules).unwrap()),
        catalog.clone(),
    );

    let report = classifier.process_object(&source, "/path").await;
    assert_eq!(report.state, SessionState::Failed);
    assert_eq!(report.placements, 0);
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(PHOTO_RULES.as_bytes()).unwrap();

    let runtime = RuleSetRuntime::from_file(file.path()).unwrap();
    assert_eq!(runtime.rule_count(), 2);
}

#[test]
fn test_malformed_file_reports_parse_error() {
    let err = RuleSetRuntime::parse("[[rule]]\nmime = ").unwrap_err();
    assert!(matches!(err, RuleError::Parse(_)));

    let err = RuleSetRuntime::from_file(&PathBuf::from("/nonexistent/rules.toml")).unwrap_err();
    assert!(matches!(err, RuleError::Io { .. }));
}

#[test]
fn test_runtime_from_config() {
    let builtin = runtime::from_config(&LayoutConfig::default()).unwrap();
    assert_eq!(builtin.name(), "builtin");

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(PHOTO_RULES.as_bytes()).unwrap();
    let rules = runtime::from_config(&LayoutConfig {
        kind: LayoutKind::Rules,
        rules_file: Some(file.path().to_path_buf()),
    })
    .unwrap();
    assert_eq!(rules.name(), "photos");

    let missing = runtime::from_config(&LayoutConfig {
        kind: LayoutKind::Rules,
        rules_file: None,
    });
    assert!(missing.is_err());
}

#[allow(dead_code)]
fn assert_send_sync() {
    fn check<T: Send + Sync>() {}
    check::<Arc<Classifier>>();
}
