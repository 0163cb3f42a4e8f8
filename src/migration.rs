use serde_json::{Map, Value};

use crate::keys::{legacy_keys, DIAGNOSIS_DRAFT_KEYS};
use crate::store::PipelineStore;
use crate::types::{non_blank, DiagnosisSummary, Pipeline, Step, StepResult};
use crate::{log_debug, log_info};

// --- Diagnosis draft field aliases ---

/// Draft field names per summary field, first non-empty wins.
const COMPANY_NAME_FIELDS: &[&str] = &["companyName", "brandName", "projectName", "serviceName"];
const INDUSTRY_FIELDS: &[&str] = &["industry", "category", "field"];
const STAGE_FIELDS: &[&str] = &["stage", "businessStage", "growthStage"];
const WEBSITE_FIELDS: &[&str] = &["website", "homepage", "siteUrl"];
const ONE_LINE_FIELDS: &[&str] = &["oneLine", "companyIntro", "oneLiner", "intro", "summary"];
const TARGET_FIELDS: &[&str] = &["targetCustomer", "target", "targetPersona", "persona"];
const VISION_FIELDS: &[&str] = &["visionHeadline", "vision", "goal"];

fn first_field(form: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| {
        non_blank(form.get(*alias).and_then(Value::as_str)).map(str::to_string)
    })
}

/// Builds a summary from a raw diagnosis draft. The fields live either under
/// a `form` object or at the top level. Returns `None` unless the draft has a
/// company name or a one-line pitch.
pub fn summary_from_draft(draft: &Value) -> Option<DiagnosisSummary> {
    let form = draft
        .get("form")
        .and_then(Value::as_object)
        .or_else(|| draft.as_object())?;

    let mut summary = DiagnosisSummary {
        company_name: first_field(form, COMPANY_NAME_FIELDS),
        one_line: first_field(form, ONE_LINE_FIELDS),
        target_persona: first_field(form, TARGET_FIELDS),
        industry: first_field(form, INDUSTRY_FIELDS),
        stage: first_field(form, STAGE_FIELDS),
        website: first_field(form, WEBSITE_FIELDS),
        vision_headline: first_field(form, VISION_FIELDS),
        ..Default::default()
    };
    if !summary.is_present() {
        return None;
    }
    summary.short_text = summary.compose_short_text();
    Some(summary)
}

fn reconstruct_diagnosis(store: &PipelineStore) -> Option<DiagnosisSummary> {
    DIAGNOSIS_DRAFT_KEYS.iter().find_map(|key| {
        let draft: Value = store.read_record(key)?;
        let summary = summary_from_draft(&draft)?;
        log_info!("[migrate:{}] diagnosis summary restored from '{}'", store.scope(), key);
        Some(summary)
    })
}

// --- Stage reconciliation ---

/// A legacy record for `step` is stale when the preceding stage holds a
/// timestamped selection and the record is either untimestamped or older.
/// Such a record predates a redo of the predecessor.
pub fn is_stale(pipeline: &Pipeline, step: Step, record: &StepResult) -> bool {
    let Some(previous) = step.previous() else {
        return false;
    };
    let Some(previous_at) = pipeline
        .step(previous)
        .filter(|result| result.has_selection())
        .and_then(|result| result.updated_at)
    else {
        return false;
    };

    match record.updated_at {
        None => true,
        Some(at) => at < previous_at,
    }
}

/// Folds diagnosis drafts and per-stage legacy records into the unified
/// pipeline. Stages that already hold a selection are left alone, so running
/// it again with unchanged inputs is a no-op. Writes only when something
/// changed; always returns the current pipeline.
pub fn migrate_legacy_to_pipeline_if_needed(store: &PipelineStore) -> Pipeline {
    let original = store.read();
    let mut pipeline = original.clone();
    let mut changed = false;

    if !pipeline.has_diagnosis() {
        if let Some(summary) = reconstruct_diagnosis(store) {
            pipeline.diagnosis_summary = Some(summary);
            changed = true;
        }
    }

    let mut accepted: usize = 0;
    let mut rejected: usize = 0;

    for step in Step::ALL {
        if pipeline.step(step).is_some_and(StepResult::has_selection) {
            continue;
        }

        for key in legacy_keys(step) {
            let Some(record) = store.read_record::<StepResult>(key) else {
                continue;
            };
            if !record.has_selection() {
                continue;
            }

            if is_stale(&pipeline, step, &record) {
                log_info!(
                    "[migrate:{}] {}: ignored stale '{}' (updated_at {:?})",
                    store.scope(),
                    step,
                    key,
                    record.updated_at
                );
                rejected += 1;
                continue;
            }

            log_info!("[migrate:{}] {}: accepted '{}'", store.scope(), step, key);
            let updated_at = record.updated_at.or_else(|| Some(store.now()));
            pipeline.set_step(
                step,
                Some(StepResult {
                    candidates: record.candidates,
                    selected_id: record.selected_id,
                    selected: record.selected,
                    updated_at,
                }),
            );
            accepted += 1;
            changed = true;
            break;
        }
    }

    if !changed {
        log_debug!("[migrate:{}] nothing to reconcile", store.scope());
        return original;
    }

    log_info!(
        "[migrate:{}] reconciled: {} stage(s) accepted, {} stale record(s) ignored",
        store.scope(),
        accepted,
        rejected
    );
    store.save(pipeline)
}
