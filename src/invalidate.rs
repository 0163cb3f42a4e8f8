use crate::keys::{legacy_keys, DIAGNOSIS_DRAFT_KEYS, DIAGNOSIS_RESULT_KEYS, PIPELINE_KEY};
use crate::store::PipelineStore;
use crate::types::{Pipeline, Step};
use crate::log_info;

/// Deletes `step` and every later stage from the unified pipeline and removes
/// every legacy record for those stages.
///
/// Legacy records must go too: some surfaces read them directly as a fallback
/// and would otherwise show a stage as done after an upstream redo.
pub fn clear_steps_from(store: &PipelineStore, step: Step) -> Pipeline {
    let cleared = step.and_downstream();

    for s in cleared {
        for key in legacy_keys(*s) {
            store.remove_record(key);
        }
    }

    let pipeline = store.update(|pipeline| {
        for s in cleared {
            pipeline.take_step(*s);
        }
    });

    log_info!(
        "[invalidate:{}] cleared {}",
        store.scope(),
        cleared
            .iter()
            .map(Step::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );

    pipeline
}

/// Every record a full reset discards: the pipeline, each stage's legacy
/// records, and all diagnosis records.
fn reset_targets() -> Vec<&'static str> {
    let mut targets = vec![PIPELINE_KEY];
    for step in Step::ALL {
        targets.extend_from_slice(legacy_keys(step));
    }
    targets.extend_from_slice(DIAGNOSIS_DRAFT_KEYS);
    targets.extend_from_slice(DIAGNOSIS_RESULT_KEYS);
    targets
}

/// Returns the scope to "before diagnosis": removes the pipeline record, every
/// stage's legacy records, and all diagnosis records. Report history is kept.
///
/// Only records actually present are removed. When the backend cannot list
/// its records, every known name is removed blindly.
pub fn reset_all(store: &PipelineStore) {
    let targets = reset_targets();
    let doomed: Vec<&str> = match store.record_keys() {
        Some(present) => targets
            .into_iter()
            .filter(|key| present.iter().any(|p| p == key))
            .collect(),
        None => targets,
    };

    for key in &doomed {
        store.remove_record(key);
    }

    log_info!(
        "[invalidate:{}] full reset: {} record(s) removed",
        store.scope(),
        doomed.len()
    );
}
