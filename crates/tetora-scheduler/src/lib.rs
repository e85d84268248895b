//! Tokio-based cron engine with SQLite persistence, feeding the
//! dispatcher a `source = "cron"` task whenever a job's schedule fires.
//!
//! | Variant    | Behaviour                                            |
//! |------------|-------------------------------------------------------|
//! | `Once`     | Single fire at an absolute UTC instant                |
//! | `Interval` | Repeat every N seconds                                |
//! | `Daily`    | Fire at HH:MM UTC every day                           |
//! | `Weekly`   | Fire at HH:MM UTC on a specific weekday               |
//! | `Cron`     | Cron expression (parsing planned for a future phase)  |

pub mod action;
pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod sink;
pub mod types;

pub use action::{job_to_task, parse_action, JobAction};
pub use engine::{run_delivery, SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use sink::JobSink;
pub use types::{FiredJob, Job, JobStatus, Schedule};
