use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tetora_core::types::Task;

/// Defines when and how often a job fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Run exactly once at the given UTC instant.
    Once { at: DateTime<Utc> },
    /// Run repeatedly with a fixed interval in seconds.
    Interval { every_secs: u64 },
    /// Run every day at the given hour and minute (UTC).
    Daily { hour: u8, minute: u8 },
    /// Run on a specific weekday (0 = Monday … 6 = Sunday) at the given time (UTC).
    Weekly { day: u8, hour: u8, minute: u8 },
    /// Run according to a cron expression (parsing support planned for a future phase).
    Cron { expression: String },
}

/// Lifecycle state of a job execution slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Missed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Missed => "missed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "missed" => Ok(JobStatus::Missed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted cron job record. `action` is an opaque JSON payload
/// (parsed by `crate::action::JobAction`) rather than a free-text string,
/// since a fired job must become a `Task` with at least a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub schedule: Schedule,
    pub action: String,
    pub status: JobStatus,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
    pub run_count: u32,
    pub max_runs: Option<u32>,
    pub created_at: String,
    pub updated_at: String,
    /// Id of the `Task` this job most recently fired, so `GET /api/agents/running`
    /// and the session/cost history for a cron-sourced task can be traced back
    /// to the job that created it.
    pub last_task_id: Option<String>,
}

/// A job at the moment its schedule fired, paired with the `Task` it became —
/// built once in `SchedulerEngine::tick`, so the tick loop itself (not just
/// the delivery worker draining it) deals in Tetora's task domain rather
/// than treating `action` as opaque all the way to the dispatcher boundary.
#[derive(Debug, Clone)]
pub struct FiredJob {
    pub job: Job,
    pub task: Task,
}
