//! The running-task table: `{id -> {task, startedAt, cancelFunc}}` from
//! spec §4.5 step 3. Grounded on
//! `skynet-gateway/src/app.rs::AppState::active_operations`
//! (`DashMap<String, CancellationToken>`), extended to also carry the task
//! snapshot and start time so `/api/agents/running` can report elapsed time
//! without a second lookup.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tetora_core::types::{Task, TaskId};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct RunningEntry {
    pub task: Task,
    pub started_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl RunningEntry {
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0)
    }
}

#[derive(Default)]
pub struct RunningTable {
    entries: DashMap<TaskId, RunningEntry>,
}

impl RunningTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task: Task, cancel: CancellationToken) {
        let entry = RunningEntry { task, started_at: Utc::now(), cancel };
        self.entries.insert(entry.task.id.clone(), entry);
    }

    pub fn remove(&self, id: &TaskId) {
        self.entries.remove(id);
    }

    pub fn get(&self, id: &TaskId) -> Option<RunningEntry> {
        self.entries.get(id).map(|e| e.clone())
    }

    pub fn list(&self) -> Vec<RunningEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    /// `!cancel` / `/api/agents/{id}/cancel`: fire the cancel function for
    /// one task. Returns `false` if the task isn't running (already
    /// finished, or never existed).
    pub fn cancel(&self, id: &TaskId) -> bool {
        match self.entries.get(id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running task — used by process shutdown and the
    /// operator-level "stop everything" command.
    pub fn cancel_all(&self) {
        for entry in self.entries.iter() {
            entry.cancel.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
