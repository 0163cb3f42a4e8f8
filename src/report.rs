use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use crate::keys::HISTORY_KEY;
use crate::store::PipelineStore;
use crate::types::{Pipeline, Snapshot, Step};
use crate::{log_debug, log_info};

pub const DEFAULT_HISTORY_CAP: usize = 30;

fn stage_label(step: Step) -> &'static str {
    match step {
        Step::Naming => "Naming",
        Step::Concept => "Concept",
        Step::Story => "Story",
        Step::Logo => "Logo",
    }
}

/// Deduplication key: the diagnosis short text followed by each stage's
/// selected identifier (empty when unselected), joined with `|`.
pub fn signature(pipeline: &Pipeline) -> Option<String> {
    let short_text = pipeline
        .diagnosis_summary
        .as_ref()?
        .effective_short_text()?;

    let mut parts = vec![short_text];
    for step in Step::ALL {
        let id = pipeline
            .step(step)
            .and_then(|result| result.selected_identifier())
            .unwrap_or_default();
        parts.push(id.to_string());
    }
    Some(parts.join("|"))
}

/// Derives a history entry. Returns `None` unless the diagnosis summary has
/// short text and all four stages have a selection.
pub fn build_snapshot(pipeline: &Pipeline, now: i64) -> Option<Snapshot> {
    let summary = pipeline.diagnosis_summary.as_ref()?;
    let short_text = summary.effective_short_text()?;

    let mut selections = BTreeMap::new();
    for step in Step::ALL {
        selections.insert(step, pipeline.selected(step)?.clone());
    }
    let signature = signature(pipeline)?;

    let company = summary
        .company_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let brand_name = selections
        .get(&Step::Naming)
        .and_then(|c| c.display_name());
    let title = match (company, brand_name) {
        (Some(company), Some(name)) => format!("{} · {}", company, name),
        (Some(only), None) | (None, Some(only)) => only.to_string(),
        (None, None) => "Brand report".to_string(),
    };

    let subtitle = Step::ALL
        .into_iter()
        .filter_map(|step| {
            selections
                .get(&step)
                .and_then(|c| c.display_name())
                .map(|name| format!("{}: {}", stage_label(step), name))
        })
        .collect::<Vec<_>>()
        .join(" · ");

    let created_iso = Utc
        .timestamp_millis_opt(now)
        .single()
        .unwrap_or_else(Utc::now)
        .to_rfc3339();

    Some(Snapshot {
        id: format!("report-{}", uuid::Uuid::new_v4()),
        title,
        subtitle,
        signature,
        created_at: now,
        created_iso,
        short_text,
        brand_id: pipeline.brand_id.clone(),
        selections,
    })
}

/// Stored history, newest first. Unreadable history reads as empty.
pub fn list_history(store: &PipelineStore) -> Vec<Snapshot> {
    store.read_record(HISTORY_KEY).unwrap_or_default()
}

pub fn latest(store: &PipelineStore) -> Option<Snapshot> {
    list_history(store).into_iter().next()
}

/// Records a snapshot of the current pipeline unless the newest stored entry
/// already has the same signature. Keeps at most `cap` entries, dropping the
/// oldest. Returns the new entry when one was added.
pub fn ensure_history_seeded(store: &PipelineStore, cap: usize) -> Option<Snapshot> {
    let pipeline = store.read();
    let Some(snapshot) = build_snapshot(&pipeline, store.now()) else {
        log_debug!("[report:{}] pipeline incomplete; history untouched", store.scope());
        return None;
    };

    let mut history = list_history(store);
    if history
        .first()
        .is_some_and(|newest| newest.signature == snapshot.signature)
    {
        log_debug!("[report:{}] newest entry already matches", store.scope());
        return None;
    }

    history.insert(0, snapshot.clone());
    history.truncate(cap.max(1));
    store.write_record(HISTORY_KEY, &history);

    log_info!(
        "[report:{}] history entry added: {} ({} total)",
        store.scope(),
        snapshot.title,
        history.len()
    );
    Some(snapshot)
}
