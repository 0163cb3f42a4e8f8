mod common;

use serde_json::json;

use brand_pipeline::keys::{legacy_keys, PIPELINE_KEY};
use brand_pipeline::migration::migrate_legacy_to_pipeline_if_needed;
use brand_pipeline::step_result::{
    completed_steps, get_selected, get_step_result, is_all_complete, select_and_invalidate,
    set_step_result, StepResultUpdate,
};
use brand_pipeline::types::{Candidate, Pipeline, PipelinePatch, Step, StepResult};

// --- set_step_result ---

#[test]
fn set_step_result_creates_stage_and_stamps_it() {
    let (_, store) = common::memory_store();

    let pipeline = set_step_result(
        &store,
        Step::Naming,
        StepResultUpdate::candidates(vec![
            common::candidate("n1", "Acme Spark"),
            common::candidate("n2", "Acme Nova"),
        ]),
    );

    let naming = pipeline.naming.unwrap();
    assert_eq!(naming.candidates.len(), 2);
    assert_eq!(naming.selected_id, None);
    assert_eq!(naming.updated_at, Some(common::NOW));
    assert_eq!(pipeline.updated_at, Some(common::NOW));
}

#[test]
fn set_step_result_merges_into_existing_stage() {
    let (_, store) = common::memory_store();
    set_step_result(
        &store,
        Step::Concept,
        StepResultUpdate::candidates(vec![common::candidate("c1", "Calm")]),
    );

    let pipeline = set_step_result(&store, Step::Concept, StepResultUpdate::select("c1"));

    let concept = pipeline.concept.unwrap();
    assert_eq!(concept.candidates, vec![common::candidate("c1", "Calm")]);
    assert_eq!(concept.selected_id.as_deref(), Some("c1"));
}

#[test]
fn selecting_a_new_id_drops_a_mismatched_denormalized_copy() {
    let (_, store) = common::memory_store();
    set_step_result(
        &store,
        Step::Logo,
        StepResultUpdate::select_candidate(common::candidate("l1", "Mark")),
    );

    let pipeline = set_step_result(&store, Step::Logo, StepResultUpdate::select("l2"));

    let logo = pipeline.logo.unwrap();
    assert_eq!(logo.selected_id.as_deref(), Some("l2"));
    assert_eq!(logo.selected, None);
}

#[test]
fn set_step_result_leaves_other_stages_alone() {
    let (storage, store) = common::memory_store();
    common::seed_pipeline(&storage, &store, &common::pipeline_through(&[Step::Naming]));

    let pipeline = set_step_result(&store, Step::Concept, StepResultUpdate::select("c1"));

    assert_eq!(pipeline.naming, common::pipeline_through(&[Step::Naming]).naming);
    assert!(pipeline.diagnosis_summary.is_some());
}

// --- get_selected ---

#[test]
fn concrete_scenario_resolves_selected_id_against_candidates() {
    let (storage, store) = common::memory_store();
    common::put_raw(
        &storage,
        &store,
        PIPELINE_KEY,
        &json!({
            "diagnosisSummary": {"companyName": "Acme", "oneLine": "We help startups launch"},
            "naming": {"selectedId": "n1", "candidates": [{"id": "n1", "name": "Acme Spark"}]},
        }),
    );

    let selected = get_selected(&store, Step::Naming).unwrap();
    assert_eq!(
        serde_json::to_value(&selected).unwrap(),
        json!({"id": "n1", "name": "Acme Spark"})
    );
}

#[test]
fn get_selected_prefers_denormalized_copy() {
    let (_, store) = common::memory_store();
    store.write(PipelinePatch::step(
        Step::Story,
        StepResult {
            candidates: vec![common::candidate("s1", "From list")],
            selected_id: Some("s1".to_string()),
            selected: Some(common::candidate("s9", "Restored copy")),
            updated_at: Some(1),
        },
    ));

    let selected = get_selected(&store, Step::Story).unwrap();
    assert_eq!(selected.id, "s9");
    assert_eq!(selected.display_name(), Some("Restored copy"));
}

#[test]
fn get_selected_without_selection_is_none() {
    let (_, store) = common::memory_store();
    assert_eq!(get_selected(&store, Step::Logo), None);

    set_step_result(
        &store,
        Step::Logo,
        StepResultUpdate::candidates(vec![common::candidate("l1", "Mark")]),
    );
    assert_eq!(get_selected(&store, Step::Logo), None);

    // Dangling id with no matching candidate
    set_step_result(&store, Step::Logo, StepResultUpdate::select("missing"));
    assert_eq!(get_selected(&store, Step::Logo), None);
    assert!(get_step_result(&store, Step::Logo).unwrap().has_selection());
}

#[test]
fn numeric_ids_from_older_records_are_normalized() {
    let (storage, store) = common::memory_store();
    common::put_raw(
        &storage,
        &store,
        PIPELINE_KEY,
        &json!({"concept": {"selectedId": 3, "candidates": [{"id": 3, "title": "Three"}, "junk"]}}),
    );

    let selected = get_selected(&store, Step::Concept).unwrap();
    assert_eq!(selected, Candidate::new("3").with_field("title", "Three"));
}

// --- select_and_invalidate ---

#[test]
fn upstream_redo_clears_downstream_stages() {
    let (storage, store) = common::memory_store();
    common::seed_pipeline(
        &storage,
        &store,
        &common::pipeline_through(&[Step::Naming, Step::Concept, Step::Story]),
    );
    common::put_raw(
        &storage,
        &store,
        legacy_keys(Step::Story)[0],
        &json!({"selectedId": "s-old"}),
    );

    let pipeline = select_and_invalidate(&store, Step::Naming, StepResultUpdate::select("naming-2"));

    assert_eq!(
        pipeline.naming.as_ref().unwrap().selected_id.as_deref(),
        Some("naming-2")
    );
    assert_eq!(pipeline.concept, None);
    assert_eq!(pipeline.story, None);
    assert_eq!(common::get_raw(&storage, &store, legacy_keys(Step::Story)[0]), None);
    assert_eq!(store.read(), pipeline);
}

#[test]
fn selecting_last_stage_clears_nothing() {
    let (storage, store) = common::memory_store();
    common::seed_pipeline(
        &storage,
        &store,
        &common::pipeline_through(&[Step::Naming, Step::Concept, Step::Story]),
    );

    let pipeline = select_and_invalidate(
        &store,
        Step::Logo,
        StepResultUpdate::select_candidate(common::candidate("l1", "Mark")),
    );

    assert_eq!(completed_steps(&pipeline), Step::ALL.to_vec());
    assert!(is_all_complete(&pipeline));
}

// --- completion queries ---

#[test]
fn completed_steps_reports_resolvable_selections_in_order() {
    let pipeline = common::pipeline_through(&[Step::Naming, Step::Concept]);
    assert_eq!(completed_steps(&pipeline), vec![Step::Naming, Step::Concept]);
    assert!(!is_all_complete(&pipeline));

    let mut unresolved = common::pipeline_through(&[Step::Naming]);
    unresolved.set_step(Step::Concept, Some(StepResult::default()));
    assert_eq!(completed_steps(&unresolved), vec![Step::Naming]);
    assert!(!is_all_complete(&Pipeline::default()));
}

#[test]
fn completed_steps_stop_at_the_first_gap() {
    let pipeline = common::pipeline_through(&[Step::Naming, Step::Story, Step::Logo]);
    assert_eq!(completed_steps(&pipeline), vec![Step::Naming]);
    assert!(!is_all_complete(&pipeline));
}

#[test]
fn legacy_stage_imported_without_naming_is_not_completed() {
    let (storage, store) = common::memory_store();
    common::seed_pipeline(&storage, &store, &common::pipeline_through(&[]));
    common::put_raw(
        &storage,
        &store,
        legacy_keys(Step::Concept)[0],
        &json!({"selectedId": "c1", "candidates": [{"id": "c1", "title": "Calm"}]}),
    );

    let pipeline = migrate_legacy_to_pipeline_if_needed(&store);

    assert!(pipeline.selected(Step::Concept).is_some());
    assert_eq!(pipeline.naming, None);
    assert!(completed_steps(&pipeline).is_empty());
}
