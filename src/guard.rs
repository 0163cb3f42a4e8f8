use crate::routes::{step_route, DIAGNOSIS_ROUTE};
use crate::store::PipelineStore;
use crate::types::{DenyReason, Pipeline, Step, StepAccess};

/// Stages that gate later ones, in order, with the reason reported when each
/// has no selection. Logo gates nothing.
const PREREQUISITES: [(Step, DenyReason); 3] = [
    (Step::Naming, DenyReason::NamingMissing),
    (Step::Concept, DenyReason::ConceptMissing),
    (Step::Story, DenyReason::StoryMissing),
];

/// Checks prerequisites for viewing `step`, strictly in stage order, and
/// reports the first one that is missing.
///
/// - naming: a diagnosis summary
/// - concept: the above plus a naming selection
/// - story: the above plus a concept selection
/// - logo: the above plus a story selection
pub fn ensure_step_access(pipeline: &Pipeline, step: Step) -> StepAccess {
    if !pipeline.has_diagnosis() {
        return StepAccess::Redirect {
            redirect_to: DIAGNOSIS_ROUTE.to_string(),
            reason: DenyReason::DiagnosisMissing,
            current_step: None,
        };
    }

    for (prerequisite, reason) in PREREQUISITES.into_iter().take(step.index()) {
        if pipeline.selected(prerequisite).is_none() {
            return StepAccess::Redirect {
                redirect_to: step_route(prerequisite).to_string(),
                reason,
                current_step: None,
            };
        }
    }

    StepAccess::Granted
}

/// `ensure_step_access`, plus: while a flow is active, a stage earlier than
/// the flow's current stage is refused with `no_back`.
pub fn ensure_strict_step_access(pipeline: &Pipeline, step: Step) -> StepAccess {
    let access = ensure_step_access(pipeline, step);
    if !access.is_ok() {
        return access;
    }

    match pipeline.brand_flow {
        Some(ref flow) if flow.active && step < flow.current_step => StepAccess::Redirect {
            redirect_to: step_route(flow.current_step).to_string(),
            reason: DenyReason::NoBack,
            current_step: Some(flow.current_step),
        },
        _ => StepAccess::Granted,
    }
}

/// Store-backed form of `ensure_step_access`.
pub fn check_step_access(store: &PipelineStore, step: Step) -> StepAccess {
    ensure_step_access(&store.read(), step)
}

/// Store-backed form of `ensure_strict_step_access`.
pub fn check_strict_step_access(store: &PipelineStore, step: Step) -> StepAccess {
    ensure_strict_step_access(&store.read(), step)
}
