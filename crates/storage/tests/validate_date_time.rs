#![forbid(unsafe_code)]

use dp_core::EntityKind;
use dp_storage::{ErrorKind, ProjectStore, ValidateOptions};
use serde_json::json;
use tempfile::TempDir;

const STORY_SCHEMA: &str = include_str!("fixtures/story.schema.json");

fn project_with_story(created: &str) -> (TempDir, ProjectStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("schemas")).expect("mkdir schemas");
    std::fs::write(dir.path().join("schemas/story.json"), STORY_SCHEMA).expect("write schema");
    let store = ProjectStore::open(dir.path());
    let story = json!({
        "id": "ST-0001",
        "title": "Date check",
        "uuid": "3f1c2a9e-8b7d-4c6e-9a1b-2d3e4f5a6b7c",
        "status": "draft",
        "created": created,
        "updated": "2025-10-26T21:50:00Z",
    });
    let path = store.record_path(EntityKind::Story, "ST-0001");
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir stories");
    std::fs::write(&path, serde_json::to_string_pretty(&story).expect("json")).expect("write");
    (dir, store)
}

#[test]
fn rejects_malformed_date_time() {
    let (_dir, store) = project_with_story("not-a-date");
    let report = store
        .validate_project(ValidateOptions::default())
        .expect("validate");

    assert_eq!(report.invalid, 1);
    assert_eq!(report.violations.len(), 1);
    let violation = &report.violations[0];
    assert_eq!(violation.path, "stories/ST-0001.json");
    assert!(violation.reason.starts_with("/created"), "{}", violation.reason);
    assert!(violation.reason.contains("date-time"), "{}", violation.reason);
    assert_eq!(
        report.into_result().expect_err("invalid").kind(),
        ErrorKind::Validation
    );
}

#[test]
fn accepts_rfc3339_date_time() {
    let (_dir, store) = project_with_story("2025-10-26T21:50:00Z");
    let report = store
        .validate_project(ValidateOptions::default())
        .expect("validate");

    assert!(report.is_ok(), "{:?}", report.violations);
    assert_eq!(report.valid, 1);
}
