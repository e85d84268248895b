//! Translates a fired `Job`'s opaque `action` payload into a `Task` with
//! `source = "cron"` (spec §4.2's non-interactive source list names
//! `cron` explicitly). The teacher's `action` field was forwarded as a
//! free-text string with no defined shape; here it's a small JSON object
//! since a cron-fired task needs at minimum a prompt.

use serde::{Deserialize, Serialize};
use tetora_core::types::Task;

use crate::error::{Result, SchedulerError};
use crate::types::Job;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAction {
    pub prompt: String,
    pub role: Option<String>,
    #[serde(default)]
    pub budget: f64,
}

pub fn parse_action(raw: &str) -> Result<JobAction> {
    serde_json::from_str(raw).map_err(|e| SchedulerError::InvalidAction(e.to_string()))
}

/// Build the `Task` a fired job becomes. `job.id` threads through as the
/// task's parent-less source tag isn't enough on its own to find the job
/// again from the dispatcher side, so it's folded into the prompt's
/// source string instead of a separate field `Task` doesn't have.
pub fn job_to_task(job: &Job) -> Result<Task> {
    let action = parse_action(&job.action)?;
    let mut task = Task::new(action.prompt, "cron");
    task.role = action.role;
    task.budget = action.budget;
    Ok(task)
}
