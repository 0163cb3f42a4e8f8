mod common;

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use brand_pipeline::error::StoreError;
use brand_pipeline::keys::PIPELINE_KEY;
use brand_pipeline::storage::{FileStorage, Scope, Storage};
use brand_pipeline::step_result::{set_step_result, StepResultUpdate};
use brand_pipeline::store::PipelineStore;
use brand_pipeline::types::{BrandId, Pipeline, PipelinePatch, Step};

// --- read ---

#[test]
fn read_missing_pipeline_returns_empty() {
    let (_, store) = common::memory_store();
    assert_eq!(store.read(), Pipeline::default());
}

#[test]
fn read_corrupt_pipeline_returns_empty() {
    let (storage, store) = common::memory_store();
    storage.set(store.scope(), PIPELINE_KEY, "{not json").unwrap();
    assert_eq!(store.read(), Pipeline::default());
}

#[test]
fn read_wrong_shape_returns_empty() {
    let (storage, store) = common::memory_store();
    common::put_raw(&storage, &store, PIPELINE_KEY, &json!(["an", "array"]));
    assert_eq!(store.read(), Pipeline::default());
}

#[test]
fn read_failing_backend_returns_empty() {
    let store = PipelineStore::new(Arc::new(common::FailingStorage), Scope::new("u"));
    assert_eq!(store.read(), Pipeline::default());
}

#[test]
fn structured_diagnosis_field_does_not_discard_the_record() {
    let (storage, store) = common::memory_store();
    common::put_raw(
        &storage,
        &store,
        PIPELINE_KEY,
        &json!({
            "diagnosisSummary": {
                "companyName": "Acme",
                "oneLine": "pitch",
                "targetPersona": {"age": "30s"},
            },
            "naming": {"selectedId": "n1", "candidates": [{"id": "n1", "name": "Acme Spark"}]},
        }),
    );

    let pipeline = store.read();
    assert!(pipeline.has_diagnosis());
    assert!(pipeline.selected(Step::Naming).is_some());
    let summary = pipeline.diagnosis_summary.unwrap();
    assert_eq!(summary.target_persona, None);
    assert_eq!(summary.extra["targetPersona"], json!({"age": "30s"}));

    set_step_result(&store, Step::Concept, StepResultUpdate::select("c1"));

    let raw = common::get_raw(&storage, &store, PIPELINE_KEY).unwrap();
    assert_eq!(raw["diagnosisSummary"]["companyName"], json!("Acme"));
    assert_eq!(raw["diagnosisSummary"]["targetPersona"], json!({"age": "30s"}));
    assert_eq!(raw["naming"]["selectedId"], json!("n1"));
    assert_eq!(raw["concept"]["selectedId"], json!("c1"));
}

#[test]
fn loosely_typed_flow_fields_read_as_defaults() {
    let (storage, store) = common::memory_store();
    common::put_raw(
        &storage,
        &store,
        PIPELINE_KEY,
        &json!({
            "diagnosisSummary": {"companyName": "Acme"},
            "brandFlow": {
                "active": true,
                "currentStep": "story",
                "startedAt": null,
                "updatedAt": 12.5,
                "completedAt": "soon",
                "pendingAbort": null,
                "abortReason": 3,
            },
        }),
    );

    let pipeline = store.read();
    assert!(pipeline.has_diagnosis());
    let flow = pipeline.brand_flow.unwrap();
    assert!(flow.active);
    assert_eq!(flow.current_step, Step::Story);
    assert_eq!(flow.started_at, 0);
    assert_eq!(flow.updated_at, 12);
    assert_eq!(flow.completed_at, None);
    assert!(!flow.pending_abort);
    assert_eq!(flow.abort_reason, None);
}

#[test]
fn misshapen_stage_is_dropped_without_losing_siblings() {
    let (storage, store) = common::memory_store();
    common::put_raw(
        &storage,
        &store,
        PIPELINE_KEY,
        &json!({
            "diagnosisSummary": {"companyName": "Acme"},
            "naming": {"selectedId": "n1", "selected": "Acme Spark"},
            "story": "done",
            "brandId": 7.5,
        }),
    );

    let pipeline = store.read();
    assert!(pipeline.has_diagnosis());
    let naming = pipeline.naming.unwrap();
    assert_eq!(naming.selected_id.as_deref(), Some("n1"));
    assert_eq!(naming.selected, None);
    assert_eq!(pipeline.story, None);
    assert_eq!(pipeline.brand_id, None);
}

// --- write ---

#[test]
fn write_merges_patch_and_stamps_updated_at() {
    let (_, store) = common::memory_store();
    store.write(PipelinePatch {
        diagnosis_summary: Some(common::acme_summary()),
        ..Default::default()
    });

    let result = store.write(PipelinePatch {
        brand_id: Some(BrandId::Number(7)),
        ..Default::default()
    });

    assert_eq!(result.diagnosis_summary, Some(common::acme_summary()));
    assert_eq!(result.brand_id, Some(BrandId::Number(7)));
    assert_eq!(result.updated_at, Some(common::NOW));
    assert_eq!(store.read(), result);
}

#[test]
fn write_with_failing_backend_is_a_noop() {
    let store = PipelineStore::new(Arc::new(common::FailingStorage), Scope::new("u"))
        .with_clock(common::fixed_clock);

    let result = store.write(PipelinePatch::step(
        Step::Naming,
        common::selected_result("n1", "Acme Spark", 1),
    ));

    // The merged value is still returned; nothing was persisted.
    assert!(result.naming.is_some());
    assert_eq!(store.read(), Pipeline::default());
}

#[test]
fn unknown_fields_survive_a_rewrite() {
    let (storage, store) = common::memory_store();
    common::put_raw(
        &storage,
        &store,
        PIPELINE_KEY,
        &json!({"brandId": "b-9", "homepageDraft": {"hero": "x"}}),
    );

    store.write(PipelinePatch::default());

    let raw = common::get_raw(&storage, &store, PIPELINE_KEY).unwrap();
    assert_eq!(raw["homepageDraft"], json!({"hero": "x"}));
    assert_eq!(raw["brandId"], json!("b-9"));
    assert_eq!(raw["updatedAt"], json!(common::NOW));
}

#[test]
fn records_are_isolated_per_scope() {
    let (storage, store) = common::memory_store();
    let other = PipelineStore::new(storage.clone(), Scope::new("user-2"));

    store.write(PipelinePatch {
        brand_id: Some(BrandId::Number(1)),
        ..Default::default()
    });

    assert_eq!(other.read(), Pipeline::default());
}

// --- error classification ---

#[test]
fn store_error_classifiers() {
    let malformed = StoreError::Malformed {
        key: "k".to_string(),
        source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
    };
    assert!(malformed.is_malformed());
    assert!(!malformed.is_access_failure());

    let unavailable = StoreError::Unavailable("gone".to_string());
    assert!(unavailable.is_access_failure());
    assert!(unavailable.to_string().contains("gone"));
}

// --- file backend ---

#[test]
fn file_storage_persists_across_store_instances() {
    let dir = TempDir::new().unwrap();
    let scope = Scope::new("alice@example.com");

    let first = PipelineStore::new(Arc::new(FileStorage::new(dir.path())), scope.clone());
    first.write(PipelinePatch {
        diagnosis_summary: Some(common::acme_summary()),
        ..Default::default()
    });

    let second = PipelineStore::new(Arc::new(FileStorage::new(dir.path())), scope.clone());
    assert_eq!(second.read().diagnosis_summary, Some(common::acme_summary()));

    let record = dir
        .path()
        .join("alice_40example_2ecom")
        .join(format!("{}.json", PIPELINE_KEY));
    assert!(record.exists(), "Expected record at {}", record.display());
}

#[test]
fn file_storage_missing_and_remove_are_quiet() {
    let dir = TempDir::new().unwrap();
    let storage = FileStorage::new(dir.path());
    let scope = Scope::new("bob");

    assert_eq!(storage.get(&scope, "nothing").unwrap(), None);
    storage.remove(&scope, "nothing").unwrap();
    assert!(storage.keys(&scope).unwrap().is_empty());

    storage.set(&scope, "b", "2").unwrap();
    storage.set(&scope, "a", "1").unwrap();
    assert_eq!(storage.keys(&scope).unwrap(), vec!["a", "b"]);

    storage.remove(&scope, "a").unwrap();
    assert_eq!(storage.get(&scope, "a").unwrap(), None);
    assert_eq!(storage.get(&scope, "b").unwrap().as_deref(), Some("2"));
}
