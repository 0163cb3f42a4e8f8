use crate::store::PipelineStore;
use crate::types::{Candidate, Pipeline, PipelinePatch, Step, StepResult};

/// Fields to merge into a stage's result. `None` keeps the stored value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepResultUpdate {
    pub candidates: Option<Vec<Candidate>>,
    pub selected_id: Option<String>,
    pub selected: Option<Candidate>,
}

impl StepResultUpdate {
    pub fn candidates(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates: Some(candidates),
            ..Default::default()
        }
    }

    pub fn select(id: &str) -> Self {
        Self {
            selected_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    /// Records the choice both by id and as a denormalized copy.
    pub fn select_candidate(candidate: Candidate) -> Self {
        Self {
            selected_id: Some(candidate.id.clone()),
            selected: Some(candidate),
            ..Default::default()
        }
    }

    fn merge_into(self, result: &mut StepResult) {
        if let Some(candidates) = self.candidates {
            result.candidates = candidates;
        }
        if let Some(id) = self.selected_id {
            // A new id invalidates a denormalized copy of a different candidate.
            if result.selected.as_ref().is_some_and(|c| c.id != id) {
                result.selected = None;
            }
            result.selected_id = Some(id);
        }
        if let Some(selected) = self.selected {
            result.selected = Some(selected);
        }
    }
}

/// Merges `update` into `step`'s result, creating it if absent, and stamps
/// the stage's `updated_at`.
///
/// Callers redoing a stage whose downstream stages hold data must follow up
/// with `invalidate::clear_steps_from(step.next())`; see `select_and_invalidate`.
pub fn set_step_result(store: &PipelineStore, step: Step, update: StepResultUpdate) -> Pipeline {
    let now = store.now();
    let mut result = store.read().step(step).cloned().unwrap_or_default();
    update.merge_into(&mut result);
    result.updated_at = Some(now);
    store.write(PipelinePatch::step(step, result))
}

/// Records a selection for `step` and clears every stage after it, so no
/// stale downstream completion survives an upstream redo.
pub fn select_and_invalidate(
    store: &PipelineStore,
    step: Step,
    update: StepResultUpdate,
) -> Pipeline {
    let pipeline = set_step_result(store, step, update);
    match step.next() {
        Some(next) if step_has_downstream_data(&pipeline, step) => {
            crate::invalidate::clear_steps_from(store, next)
        }
        _ => pipeline,
    }
}

fn step_has_downstream_data(pipeline: &Pipeline, step: Step) -> bool {
    step.next()
        .map(|next| next.and_downstream().iter().any(|s| pipeline.step(*s).is_some()))
        .unwrap_or(false)
}

pub fn get_step_result(store: &PipelineStore, step: Step) -> Option<StepResult> {
    store.read().step(step).cloned()
}

/// The selected candidate for `step`, or `None`. Never fails.
pub fn get_selected(store: &PipelineStore, step: Step) -> Option<Candidate> {
    store.read().selected(step).cloned()
}

/// The unbroken run of stages, from naming on, that have a resolvable
/// selection. A stage after a gap is never reported as completed.
pub fn completed_steps(pipeline: &Pipeline) -> Vec<Step> {
    Step::ALL
        .into_iter()
        .take_while(|step| pipeline.selected(*step).is_some())
        .collect()
}

pub fn is_all_complete(pipeline: &Pipeline) -> bool {
    Step::ALL
        .into_iter()
        .all(|step| pipeline.selected(step).is_some())
}
