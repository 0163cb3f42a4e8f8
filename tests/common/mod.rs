#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;

use brand_pipeline::error::StoreError;
use brand_pipeline::keys::PIPELINE_KEY;
use brand_pipeline::storage::{MemoryStorage, Scope, Storage};
use brand_pipeline::store::PipelineStore;
use brand_pipeline::types::{Candidate, DiagnosisSummary, Pipeline, Step, StepResult};

/// Fixed "now" used by every test store: 2026-02-10T00:00:00Z.
pub const NOW: i64 = 1_770_681_600_000;

pub fn fixed_clock() -> i64 {
    NOW
}

/// A store over fresh in-memory storage, plus a handle to the raw storage for
/// seeding and inspecting records directly.
pub fn memory_store() -> (Arc<MemoryStorage>, PipelineStore) {
    let storage = Arc::new(MemoryStorage::new());
    let store = PipelineStore::new(storage.clone(), Scope::new("user-1")).with_clock(fixed_clock);
    (storage, store)
}

pub fn put_raw(storage: &MemoryStorage, store: &PipelineStore, key: &str, value: &Value) {
    storage
        .set(store.scope(), key, &value.to_string())
        .expect("Failed to seed record");
}

pub fn get_raw(storage: &MemoryStorage, store: &PipelineStore, key: &str) -> Option<Value> {
    storage
        .get(store.scope(), key)
        .expect("Failed to read record")
        .map(|raw| serde_json::from_str(&raw).expect("Stored record is not JSON"))
}

/// Creates a candidate with a `name` field.
pub fn candidate(id: &str, name: &str) -> Candidate {
    Candidate::new(id).with_field("name", name)
}

pub fn acme_summary() -> DiagnosisSummary {
    DiagnosisSummary {
        company_name: Some("Acme".to_string()),
        one_line: Some("We help startups launch".to_string()),
        short_text: Some("Acme · We help startups launch".to_string()),
        ..Default::default()
    }
}

/// A stage result whose selection resolves through its candidate list.
pub fn selected_result(id: &str, name: &str, updated_at: i64) -> StepResult {
    StepResult {
        candidates: vec![candidate(id, name)],
        selected_id: Some(id.to_string()),
        selected: None,
        updated_at: Some(updated_at),
    }
}

/// Writes `pipeline` verbatim as the stored pipeline record.
pub fn seed_pipeline(storage: &MemoryStorage, store: &PipelineStore, pipeline: &Pipeline) {
    put_raw(
        storage,
        store,
        PIPELINE_KEY,
        &serde_json::to_value(pipeline).expect("Failed to encode pipeline"),
    );
}

/// A pipeline with a diagnosis summary and selections for every stage in
/// `steps`.
pub fn pipeline_through(steps: &[Step]) -> Pipeline {
    let mut pipeline = Pipeline {
        diagnosis_summary: Some(acme_summary()),
        ..Default::default()
    };
    for (i, step) in steps.iter().enumerate() {
        let id = format!("{}-1", step.as_str());
        let name = format!("{} pick", step.as_str());
        pipeline.set_step(*step, Some(selected_result(&id, &name, 100 + i as i64)));
    }
    pipeline
}

/// Backend that fails every call, for exercising fail-open behavior.
pub struct FailingStorage;

impl Storage for FailingStorage {
    fn get(&self, _scope: &Scope, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".to_string()))
    }

    fn set(&self, _scope: &Scope, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk on fire".to_string()))
    }

    fn remove(&self, _scope: &Scope, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk on fire".to_string()))
    }

    fn keys(&self, _scope: &Scope) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".to_string()))
    }
}
