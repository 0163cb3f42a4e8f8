use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::keys::PIPELINE_KEY;
use crate::storage::{Scope, Storage};
use crate::types::{now_ms, Pipeline, PipelinePatch};
use crate::{log_debug, log_warn};

/// Source of "now" in epoch milliseconds.
pub type Clock = fn() -> i64;

/// Read/merge/write access to one scope's pipeline record and the legacy
/// records around it.
///
/// Fails open: every storage or decode failure is logged and treated as
/// absence on reads, and as a dropped write on writes.
#[derive(Clone)]
pub struct PipelineStore {
    storage: Arc<dyn Storage>,
    scope: Scope,
    clock: Clock,
}

impl std::fmt::Debug for PipelineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStore")
            .field("scope", &self.scope)
            .finish()
    }
}

impl PipelineStore {
    pub fn new(storage: Arc<dyn Storage>, scope: Scope) -> Self {
        Self {
            storage,
            scope,
            clock: now_ms,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Current pipeline, or an empty one when missing or unreadable.
    pub fn read(&self) -> Pipeline {
        self.read_record(PIPELINE_KEY).unwrap_or_default()
    }

    /// Shallow-merges `patch` over the current pipeline, stamps `updated_at`,
    /// persists, and returns the result.
    pub fn write(&self, patch: PipelinePatch) -> Pipeline {
        self.update(|pipeline| patch.apply_to(pipeline))
    }

    /// Read-modify-write with an arbitrary mutation. Stamps `updated_at`.
    pub fn update<F>(&self, mutate: F) -> Pipeline
    where
        F: FnOnce(&mut Pipeline),
    {
        let mut pipeline = self.read();
        mutate(&mut pipeline);
        pipeline.updated_at = Some(self.now());
        self.write_record(PIPELINE_KEY, &pipeline);
        pipeline
    }

    /// Replaces the stored pipeline wholesale. Stamps `updated_at`.
    pub fn save(&self, mut pipeline: Pipeline) -> Pipeline {
        pipeline.updated_at = Some(self.now());
        self.write_record(PIPELINE_KEY, &pipeline);
        pipeline
    }

    // --- Raw record access ---

    /// Decodes a record. Absence, backend failure, and malformed JSON all
    /// yield `None`.
    pub fn read_record<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_read_record(key) {
            Ok(value) => value,
            Err(err) if err.is_malformed() => {
                log_debug!("[store:{}] {}; treating as absent", self.scope, err);
                None
            }
            Err(err) => {
                log_warn!("[store:{}] read failed: {}", self.scope, err);
                None
            }
        }
    }

    fn try_read_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.storage.get(&self.scope, key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Malformed {
                key: key.to_string(),
                source,
            })
    }

    /// Encodes and persists a record. Failures are logged and dropped.
    pub fn write_record<T: Serialize>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(|source| StoreError::Encode {
                key: key.to_string(),
                source,
            })
            .and_then(|json| self.storage.set(&self.scope, key, &json));
        if let Err(err) = result {
            log_warn!("[store:{}] write to '{}' dropped: {}", self.scope, key, err);
        }
    }

    /// Names of every record stored in this scope, or `None` when the backend
    /// cannot list them.
    pub fn record_keys(&self) -> Option<Vec<String>> {
        match self.storage.keys(&self.scope) {
            Ok(keys) => Some(keys),
            Err(err) => {
                log_warn!("[store:{}] listing records failed: {}", self.scope, err);
                None
            }
        }
    }

    /// Deletes a record. Missing records and failures are both no-ops.
    pub fn remove_record(&self, key: &str) {
        if let Err(err) = self.storage.remove(&self.scope, key) {
            log_warn!("[store:{}] remove '{}' dropped: {}", self.scope, key, err);
        }
    }
}
