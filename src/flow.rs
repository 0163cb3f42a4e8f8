//! Strictly ordered brand runs.
//!
//! States: inactive -> naming -> concept -> story -> logo -> completed, with
//! `abort` reachable from any active state. A pending abort is a two-phase
//! request: `mark_pending_abort` records it without touching stage data and
//! `consume_pending_abort` checks and clears it in one call.

use crate::invalidate::clear_steps_from;
use crate::routes::step_route;
use crate::store::PipelineStore;
use crate::types::{BrandId, FlowPhase, FlowState, Pipeline, PipelinePatch, Step};
use crate::{log_debug, log_info, log_warn};

/// Begins a fresh run: wipes every stage, records `brand_id` when given, and
/// points the flow at naming.
pub fn start(store: &PipelineStore, brand_id: Option<BrandId>) -> Pipeline {
    clear_steps_from(store, Step::Naming);

    let now = store.now();
    let state = FlowState {
        active: true,
        current_step: Step::Naming,
        started_at: now,
        updated_at: now,
        pending_abort: false,
        ..Default::default()
    };

    log_info!(
        "[flow:{}] started{}",
        store.scope(),
        brand_id
            .as_ref()
            .map(|id| format!(" for brand {}", id))
            .unwrap_or_default()
    );

    store.write(PipelinePatch {
        brand_id,
        brand_flow: Some(state),
        ..Default::default()
    })
}

/// Moves the flow pointer to `step` (unknown names become naming), keeps
/// `started_at`, and clears any pending abort.
///
/// While a flow is active the pointer never moves backwards; an earlier `step`
/// leaves the current stage in place.
pub fn set_current(store: &PipelineStore, step: &str) -> Pipeline {
    let requested = Step::parse_lossy(step);
    let now = store.now();

    store.update(|pipeline| {
        let previous = pipeline.brand_flow.take();
        let target = match previous {
            Some(ref flow) if flow.active && requested < flow.current_step => {
                log_warn!(
                    "[flow] refusing to move back from {} to {}",
                    flow.current_step,
                    requested
                );
                flow.current_step
            }
            _ => requested,
        };

        pipeline.brand_flow = Some(FlowState {
            active: true,
            current_step: target,
            started_at: previous.as_ref().map(|f| f.started_at).unwrap_or(now),
            updated_at: now,
            pending_abort: false,
            pending_reason: None,
            ..Default::default()
        });
    })
}

/// Moves to the stage after the current one, or completes the run after logo.
pub fn advance(store: &PipelineStore) -> Pipeline {
    let current = store
        .read()
        .brand_flow
        .filter(|flow| flow.active)
        .map(|flow| flow.current_step);

    match current {
        Some(step) => match step.next() {
            Some(next) => set_current(store, next.as_str()),
            None => complete(store),
        },
        None => set_current(store, Step::Naming.as_str()),
    }
}

/// Cancels the run: wipes every stage and records why.
pub fn abort(store: &PipelineStore, reason: &str) -> Pipeline {
    clear_steps_from(store, Step::Naming);

    let now = store.now();
    log_info!("[flow:{}] aborted: {}", store.scope(), reason);

    store.update(|pipeline| {
        let started_at = pipeline
            .brand_flow
            .as_ref()
            .map(|f| f.started_at)
            .unwrap_or(now);
        pipeline.brand_flow = Some(FlowState {
            active: false,
            current_step: Step::Naming,
            started_at,
            updated_at: now,
            aborted_at: Some(now),
            abort_reason: Some(reason.to_string()),
            pending_abort: false,
            ..Default::default()
        });
    })
}

/// Ends the run successfully. Stage data is kept as the finished result.
pub fn complete(store: &PipelineStore) -> Pipeline {
    let now = store.now();
    log_info!("[flow:{}] completed", store.scope());

    store.update(|pipeline| {
        let mut state = pipeline.brand_flow.take().unwrap_or(FlowState {
            current_step: Step::Logo,
            started_at: now,
            ..Default::default()
        });
        state.active = false;
        state.completed_at = Some(now);
        state.updated_at = now;
        state.pending_abort = false;
        state.pending_reason = None;
        pipeline.brand_flow = Some(state);
    })
}

/// Records a deferred abort request on an active flow. Returns whether a
/// request was recorded.
pub fn mark_pending_abort(store: &PipelineStore, reason: &str) -> bool {
    let active = store
        .read()
        .brand_flow
        .is_some_and(|flow| flow.active);
    if !active {
        log_debug!("[flow:{}] no active flow; pending abort ignored", store.scope());
        return false;
    }

    let now = store.now();
    store.update(|pipeline| {
        if let Some(ref mut flow) = pipeline.brand_flow {
            flow.pending_abort = true;
            flow.pending_reason = Some(reason.to_string());
            flow.updated_at = now;
        }
    });
    log_info!("[flow:{}] abort requested: {}", store.scope(), reason);
    true
}

/// Check-and-clear of a pending abort. Returns true only when an active flow
/// had one; the caller then decides whether to `abort`.
pub fn consume_pending_abort(store: &PipelineStore) -> bool {
    let pending = store
        .read()
        .brand_flow
        .is_some_and(|flow| flow.active && flow.pending_abort);
    if !pending {
        return false;
    }

    let now = store.now();
    store.update(|pipeline| {
        if let Some(ref mut flow) = pipeline.brand_flow {
            flow.pending_abort = false;
            flow.pending_reason = None;
            flow.updated_at = now;
        }
    });
    true
}

/// Lifecycle position of the stored flow.
pub fn status(pipeline: &Pipeline) -> FlowPhase {
    match pipeline.brand_flow {
        None => FlowPhase::Inactive,
        Some(ref flow) if flow.active => FlowPhase::Running(flow.current_step),
        Some(ref flow) if flow.completed_at.is_some() => FlowPhase::Completed,
        Some(ref flow) if flow.aborted_at.is_some() => FlowPhase::Aborted,
        Some(_) => FlowPhase::Inactive,
    }
}

/// Entry route for the flow's current stage, if a flow is active.
pub fn current_route(pipeline: &Pipeline) -> Option<&'static str> {
    pipeline
        .brand_flow
        .as_ref()
        .filter(|flow| flow.active)
        .map(|flow| step_route(flow.current_step))
}
