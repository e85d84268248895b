use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    action::{job_to_task, parse_action},
    db::init_db,
    error::{Result, SchedulerError},
    schedule::compute_next_run,
    sink::JobSink,
    types::{FiredJob, Job, JobStatus, Schedule},
};

/// Shared handle for job management (list/add/remove) while the engine loop
/// runs, using its own `Connection` so HTTP handlers can manage jobs
/// without contending with the engine's polling queries.
pub struct SchedulerHandle {
    conn: Arc<Mutex<Connection>>,
}

impl SchedulerHandle {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn add_job(&self, name: &str, schedule: Schedule, action: &str) -> Result<Job> {
        let conn = self.conn.lock().unwrap();
        insert_job(&conn, name, schedule, action)
    }

    pub fn remove_job(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        delete_job(&conn, id)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        select_jobs(&conn)
    }
}

/// Validates `action` against the `JobAction` shape before the job is ever
/// persisted — unlike the teacher's scheduler, which forwarded `action` as a
/// free-text string with no defined shape and could only fail at fire time,
/// a job here is a `Task` in waiting, so a malformed payload is rejected at
/// registration instead of silently dying in `run_delivery` days later.
fn insert_job(conn: &Connection, name: &str, schedule: Schedule, action: &str) -> Result<Job> {
    parse_action(action)?;

    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let next = compute_next_run(&schedule, now).map(|dt| dt.to_rfc3339());
    let id = Uuid::new_v4().to_string();
    let schedule_json =
        serde_json::to_string(&schedule).map_err(|e| SchedulerError::InvalidSchedule(e.to_string()))?;

    conn.execute(
        "INSERT INTO jobs
         (id, name, schedule, action, status, last_run, next_run,
          run_count, max_runs, created_at, updated_at, last_task_id)
         VALUES (?1,?2,?3,?4,'pending',NULL,?5,0,NULL,?6,?6,NULL)",
        rusqlite::params![id, name, schedule_json, action, next, now_str],
    )?;
    info!(job_id = %id, %name, "job added");

    Ok(Job {
        id,
        name: name.to_string(),
        schedule,
        action: action.to_string(),
        status: JobStatus::Pending,
        last_run: None,
        next_run: next,
        run_count: 0,
        max_runs: None,
        created_at: now_str.clone(),
        updated_at: now_str,
        last_task_id: None,
    })
}

fn delete_job(conn: &Connection, id: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
    if n == 0 {
        return Err(SchedulerError::JobNotFound { id: id.to_string() });
    }
    info!(job_id = %id, "job removed");
    Ok(())
}

#[allow(clippy::type_complexity)]
fn select_jobs(conn: &Connection) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, schedule, action, status, last_run, next_run,
                run_count, max_runs, created_at, updated_at, last_task_id
         FROM jobs ORDER BY created_at",
    )?;
    let jobs = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, u32>(7)?,
                row.get::<_, Option<u32>>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, Option<String>>(11)?,
            ))
        })?
        .filter_map(|r| {
            let (
                id,
                name,
                sched_json,
                action,
                status_str,
                last_run,
                next_run,
                run_count,
                max_runs,
                created_at,
                updated_at,
                last_task_id,
            ) = r.ok()?;
            let schedule: Schedule = serde_json::from_str(&sched_json).ok()?;
            let status: JobStatus = status_str.parse().ok()?;
            Some(Job {
                id,
                name,
                schedule,
                action,
                status,
                last_run,
                next_run,
                run_count,
                max_runs,
                created_at,
                updated_at,
                last_task_id,
            })
        })
        .collect();
    Ok(jobs)
}

/// Core scheduler: persists jobs to SQLite and drives execution at ±1 s
/// precision. Unchanged in shape from the source it generalizes — still a
/// plain 1 Hz poll loop over a `next_run <= now` query, delivering fired
/// jobs through an mpsc channel rather than calling out directly, so the
/// tick loop is never stalled by a slow delivery consumer.
pub struct SchedulerEngine {
    conn: Connection,
    fired_tx: Option<mpsc::Sender<FiredJob>>,
}

impl SchedulerEngine {
    pub fn new(conn: Connection, fired_tx: Option<mpsc::Sender<FiredJob>>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn, fired_tx })
    }

    pub fn add_job(&self, name: &str, schedule: Schedule, action: &str) -> Result<Job> {
        insert_job(&self.conn, name, schedule, action)
    }

    pub fn remove_job(&self, id: &str) -> Result<()> {
        delete_job(&self.conn, id)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        select_jobs(&self.conn)
    }

    /// Main event loop. Polls every second until `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        self.mark_missed_on_startup();

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn mark_missed_on_startup(&mut self) {
        let now = Utc::now().to_rfc3339();
        match self.conn.execute(
            "UPDATE jobs SET status = 'missed', updated_at = ?1
             WHERE status = 'pending' AND next_run IS NOT NULL AND next_run < ?1",
            [&now],
        ) {
            Ok(n) if n > 0 => warn!(count = n, "jobs marked missed on startup"),
            Err(e) => error!("missed-on-startup query failed: {e}"),
            _ => {}
        }
    }

    fn tick(&mut self) -> Result<()> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let due: Vec<(String, String, String, String, u32, Option<u32>)> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT id, name, schedule, action, run_count, max_runs FROM jobs
                 WHERE status = 'pending' AND next_run IS NOT NULL AND next_run <= ?1",
            )?;
            let rows: Vec<_> = stmt
                .query_map([&now_str], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, Option<u32>>(5)?,
                    ))
                })?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        for (id, name, sched_json, action, run_count, max_runs) in due {
            let schedule: Schedule = match serde_json::from_str(&sched_json) {
                Ok(s) => s,
                Err(e) => {
                    error!(job_id = %id, "bad schedule JSON: {e}");
                    continue;
                }
            };

            let new_count = run_count + 1;
            let next = if max_runs.is_some_and(|m| new_count >= m) {
                None
            } else {
                compute_next_run(&schedule, now).map(|dt| dt.to_rfc3339())
            };
            let new_status = if next.is_none() { "completed" } else { "pending" };

            let job = Job {
                id: id.clone(),
                name: name.clone(),
                schedule,
                action: action.clone(),
                status: JobStatus::Pending,
                last_run: Some(now_str.clone()),
                next_run: next.clone(),
                run_count: new_count,
                max_runs,
                created_at: String::new(),
                updated_at: now_str.clone(),
                last_task_id: None,
            };

            // Built here rather than left to `run_delivery`, so a job whose
            // action no longer parses (schema drifted since it was added)
            // is caught and logged against the firing job, not discarded
            // silently downstream.
            let task = match job_to_task(&job) {
                Ok(t) => t,
                Err(e) => {
                    error!(job_id = %id, error = %e, "firing job's action no longer parses, skipping fire");
                    continue;
                }
            };
            let task_id = task.id.as_str().to_string();

            info!(job_id = %id, %name, run = new_count, task_id = %task_id, next_status = %new_status, "firing job");

            self.conn.execute(
                "UPDATE jobs SET status=?1, last_run=?2, next_run=?3,
                  run_count=?4, updated_at=?2, last_task_id=?5
                 WHERE id=?6",
                rusqlite::params![new_status, now_str, next, new_count, task_id, id],
            )?;

            if let Some(ref tx) = self.fired_tx {
                let mut fired_job = job;
                fired_job.last_task_id = Some(task_id);
                if tx.try_send(FiredJob { job: fired_job, task }).is_err() {
                    warn!(job_id = %id, "delivery channel full or closed — job dropped");
                }
            }
        }
        Ok(())
    }
}

/// Drains fired jobs off `rx` and submits each job's already-built
/// `source = "cron"` `Task` (spec §4.2's non-interactive source list)
/// through `sink`. `SchedulerEngine::tick` builds the `Task` itself, so
/// this worker is purely the handoff into C5 — run as its own task
/// alongside `SchedulerEngine::run` so a slow dispatcher never delays the
/// next poll.
pub async fn run_delivery(mut rx: mpsc::Receiver<FiredJob>, sink: Arc<dyn JobSink>) {
    while let Some(fired) = rx.recv().await {
        let task_id = sink.submit(fired.task).await;
        info!(job_id = %fired.job.id, %task_id, "cron job submitted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tetora_core::types::Task;

    fn conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn add_list_remove_round_trip() {
        let handle = SchedulerHandle::new(conn()).unwrap();
        let job = handle
            .add_job("nightly", Schedule::Interval { every_secs: 60 }, r#"{"prompt":"x"}"#)
            .unwrap();
        assert_eq!(handle.list_jobs().unwrap().len(), 1);
        handle.remove_job(&job.id).unwrap();
        assert!(handle.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn removing_an_unknown_job_errors() {
        let handle = SchedulerHandle::new(conn()).unwrap();
        assert!(matches!(handle.remove_job("nope"), Err(SchedulerError::JobNotFound { .. })));
    }

    #[test]
    fn adding_a_job_with_a_malformed_action_is_rejected_up_front() {
        let handle = SchedulerHandle::new(conn()).unwrap();
        let err = handle.add_job("bad", Schedule::Interval { every_secs: 60 }, "not json").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidAction(_)));
        assert!(handle.list_jobs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tick_fires_a_due_job_and_advances_its_schedule() {
        let (tx, mut rx) = mpsc::channel(8);
        let c = conn();
        let engine = SchedulerEngine::new(c, Some(tx)).unwrap();
        engine
            .add_job("every-minute", Schedule::Interval { every_secs: 60 }, r#"{"prompt":"x"}"#)
            .unwrap();

        // Force the job due by rewriting next_run into the past directly.
        {
            let rows = engine.list_jobs().unwrap();
            let job_id = &rows[0].id;
            let past = (Utc::now() - chrono::Duration::seconds(5)).to_rfc3339();
            engine.conn.execute("UPDATE jobs SET next_run = ?1 WHERE id = ?2", rusqlite::params![past, job_id]).unwrap();
        }

        let mut engine = engine;
        engine.tick().unwrap();

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.job.run_count, 1);
        assert_eq!(fired.task.prompt, "x");
        assert_eq!(fired.task.source.as_str(), "cron");
        assert_eq!(fired.job.last_task_id, Some(fired.task.id.as_str().to_string()));
        let stored = engine.list_jobs().unwrap();
        assert_eq!(stored[0].status, JobStatus::Pending);
        assert_eq!(stored[0].last_task_id, Some(fired.task.id.as_str().to_string()));
    }

    struct RecordingSink {
        tasks: StdMutex<Vec<Task>>,
    }

    #[async_trait]
    impl JobSink for RecordingSink {
        async fn submit(&self, task: Task) -> tetora_core::types::TaskId {
            let id = task.id.clone();
            self.tasks.lock().unwrap().push(task);
            id
        }
    }

    #[tokio::test]
    async fn run_delivery_forwards_the_fired_jobs_task_to_the_sink() {
        let (tx, rx) = mpsc::channel(8);
        let sink = Arc::new(RecordingSink { tasks: StdMutex::new(vec![]) });
        let delivery = tokio::spawn(run_delivery(rx, sink.clone()));

        let job = Job {
            id: "j1".to_string(),
            name: "n".to_string(),
            schedule: Schedule::Interval { every_secs: 60 },
            action: r#"{"prompt":"do the thing"}"#.to_string(),
            status: JobStatus::Pending,
            last_run: None,
            next_run: None,
            run_count: 1,
            max_runs: None,
            created_at: String::new(),
            updated_at: String::new(),
            last_task_id: None,
        };
        let task = job_to_task(&job).unwrap();
        tx.send(FiredJob { job, task }).await.unwrap();
        drop(tx);
        delivery.await.unwrap();

        let tasks = sink.tasks.lock().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].source.as_str(), "cron");
    }
}
