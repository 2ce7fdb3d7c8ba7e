//! Durable, priority-ordered queue of scheduled work, keyed by `(handler, key)`.
//!
//! Single writer, SQLite-backed, following the same connection-wrapper shape
//! as [`crate::changelog::ChangeLog`].

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use wikibots_domain::Clock;
use wikibots_domain::Value;

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    IgnoreDups,
    OverwriteIfExists,
    IgnoreIfExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerateControl {
    Continue,
    Halt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: i64,
    pub handler: String,
    pub key: String,
    pub priority: i32,
    pub inserted_on: DateTime<Utc>,
    /// `None` means "ready immediately".
    pub run_after: Option<DateTime<Utc>>,
    pub parameters: Value,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_attempt_result: Value,
}

impl Job {
    pub fn new(
        handler: impl Into<String>,
        key: impl Into<String>,
        priority: i32,
        inserted_on: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            handler: handler.into(),
            key: key.into(),
            priority,
            inserted_on,
            run_after: None,
            parameters: Value::map(),
            last_attempt: None,
            last_attempt_result: Value::Null,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_run_after(mut self, run_after: DateTime<Utc>) -> Self {
        self.run_after = Some(run_after);
        self
    }

    /// The part of `handler` before the first `.`, used for dispatch.
    pub fn handler_prefix(&self) -> &str {
        self.handler.split('.').next().unwrap_or(&self.handler)
    }
}

#[derive(Debug, Clone)]
pub struct RescheduleEntry {
    pub id: i64,
    pub new_priority: Option<i32>,
    pub new_run_after: DateTime<Utc>,
    pub new_last_attempt_result: Option<Value>,
}

pub struct JobQueue {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl JobQueue {
    pub fn open(path: impl AsRef<std::path::Path>, clock: Arc<dyn Clock>) -> Result<Self, JobQueueError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS job (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                handler TEXT NOT NULL,
                key TEXT NOT NULL,
                priority INTEGER NOT NULL,
                inserted_on INTEGER NOT NULL,
                run_after INTEGER,
                ready INTEGER NOT NULL DEFAULT 0,
                parameters TEXT,
                last_attempt INTEGER,
                last_attempt_result TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_job_run_after ON job(run_after) WHERE ready=0;
             CREATE INDEX IF NOT EXISTS idx_job_ready_priority ON job(priority, run_after, id) WHERE ready=1;
             CREATE INDEX IF NOT EXISTS idx_job_handler_key ON job(handler, key);
             CREATE TABLE IF NOT EXISTS job_flags (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    pub fn start_from_most_recent(&self) -> Result<bool, JobQueueError> {
        let conn = self.conn.lock().unwrap();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM job_flags WHERE key = 'start_from_most_recent'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.as_deref() == Some("1"))
    }

    pub fn insert(&self, job: Job, mode: InsertMode) -> Result<i64, JobQueueError> {
        if job.handler.is_empty() {
            return Err(JobQueueError::Validation("handler must not be empty".into()));
        }
        let now = self.clock.now();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let id = insert_one(&tx, &job, mode, now)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn insert_many(&self, jobs: Vec<Job>, mode: InsertMode) -> Result<Vec<i64>, JobQueueError> {
        for job in &jobs {
            if job.handler.is_empty() {
                return Err(JobQueueError::Validation("handler must not be empty".into()));
            }
        }
        let now = self.clock.now();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(jobs.len());
        for job in &jobs {
            ids.push(insert_one(&tx, job, mode, now)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    pub fn remove(&self, id: i64) -> Result<(), JobQueueError> {
        self.remove_many(&[id])
    }

    /// Deletes the given jobs. When removing a single job, first checks
    /// whether it was the unique oldest ready job and updates the
    /// `start_from_most_recent` fairness flag accordingly, so the next
    /// `enumerate_ready` pass favors the newest job at that priority instead
    /// of starving it behind a repeatedly-failing oldest entry.
    pub fn remove_many(&self, ids: &[i64]) -> Result<(), JobQueueError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        if ids.len() == 1 {
            update_start_from_most_recent(&tx, ids[0])?;
        }
        for id in ids {
            tx.execute("DELETE FROM job WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Updates the given jobs' schedule. The fairness flag is refreshed once,
    /// against the last entry in `entries`, mirroring [`remove_many`]'s
    /// single-id special case.
    pub fn reschedule_many(&self, entries: &[RescheduleEntry]) -> Result<(), JobQueueError> {
        let now = self.clock.now();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        if let Some(last) = entries.last() {
            update_start_from_most_recent(&tx, last.id)?;
        }
        for entry in entries {
            let ready = entry.new_run_after <= now;
            match &entry.new_last_attempt_result {
                Some(result) => {
                    let json = serde_json::to_string(result).unwrap_or_default();
                    if let Some(priority) = entry.new_priority {
                        tx.execute(
                            "UPDATE job SET priority = ?1, run_after = ?2, ready = ?3,
                                last_attempt = ?4, last_attempt_result = ?5 WHERE id = ?6",
                            params![priority, entry.new_run_after.timestamp(), ready as i32, now.timestamp(), json, entry.id],
                        )?;
                    } else {
                        tx.execute(
                            "UPDATE job SET run_after = ?1, ready = ?2,
                                last_attempt = ?3, last_attempt_result = ?4 WHERE id = ?5",
                            params![entry.new_run_after.timestamp(), ready as i32, now.timestamp(), json, entry.id],
                        )?;
                    }
                }
                None => {
                    if let Some(priority) = entry.new_priority {
                        tx.execute(
                            "UPDATE job SET priority = ?1, run_after = ?2, ready = ?3 WHERE id = ?4",
                            params![priority, entry.new_run_after.timestamp(), ready as i32, entry.id],
                        )?;
                    } else {
                        tx.execute(
                            "UPDATE job SET run_after = ?1, ready = ?2 WHERE id = ?3",
                            params![entry.new_run_after.timestamp(), ready as i32, entry.id],
                        )?;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Promotes due rows, then visits ready rows priority by priority,
    /// interleaving an oldest-first and a newest-first cursor within each
    /// priority level.
    pub fn enumerate_ready(
        &self,
        mut callback: impl FnMut(&Job) -> EnumerateControl,
    ) -> Result<(), JobQueueError> {
        let now = self.clock.now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE job SET ready = 1 WHERE ready = 0 AND (run_after IS NULL OR run_after <= ?1)",
            params![now.timestamp()],
        )?;

        let start_from_most_recent = {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM job_flags WHERE key = 'start_from_most_recent'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            value.as_deref() == Some("1")
        };

        let priorities: Vec<i32> = conn
            .prepare("SELECT DISTINCT priority FROM job WHERE ready = 1 ORDER BY priority ASC")?
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        for priority in priorities {
            let mut stmt = conn.prepare(
                "SELECT id, handler, key, priority, inserted_on, run_after, parameters,
                        last_attempt, last_attempt_result
                 FROM job WHERE ready = 1 AND priority = ?1
                 ORDER BY run_after ASC, id ASC",
            )?;
            let rows: Vec<Job> = stmt
                .query_map(params![priority], row_to_job)?
                .collect::<Result<_, _>>()?;

            if rows.is_empty() {
                continue;
            }

            let mut lo = 0usize;
            let mut hi = rows.len() - 1;
            let mut turn_newest = start_from_most_recent;
            loop {
                let idx = if turn_newest { hi } else { lo };
                if callback(&rows[idx]) == EnumerateControl::Halt {
                    return Ok(());
                }
                if lo == hi {
                    break;
                }
                if turn_newest {
                    hi -= 1;
                } else {
                    lo += 1;
                }
                turn_newest = !turn_newest;
            }
        }

        Ok(())
    }

    pub fn enumerate_all(
        &self,
        mut callback: impl FnMut(&Job) -> EnumerateControl,
    ) -> Result<(), JobQueueError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, handler, key, priority, inserted_on, run_after, parameters,
                    last_attempt, last_attempt_result
             FROM job ORDER BY id ASC",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let job = row_to_job(row)?;
            if callback(&job) == EnumerateControl::Halt {
                break;
            }
        }
        Ok(())
    }

    pub fn enumerate_by_handler(
        &self,
        handler: &str,
        mut callback: impl FnMut(&Job) -> EnumerateControl,
    ) -> Result<(), JobQueueError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, handler, key, priority, inserted_on, run_after, parameters,
                    last_attempt, last_attempt_result
             FROM job WHERE handler = ?1 ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![handler])?;
        while let Some(row) = rows.next()? {
            let job = row_to_job(row)?;
            if callback(&job) == EnumerateControl::Halt {
                break;
            }
        }
        Ok(())
    }

    pub fn get_by_handler_and_key(&self, handler: &str, key: &str) -> Result<Option<Job>, JobQueueError> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                "SELECT id, handler, key, priority, inserted_on, run_after, parameters,
                        last_attempt, last_attempt_result
                 FROM job WHERE handler = ?1 AND key = ?2 ORDER BY id ASC LIMIT 1",
                params![handler, key],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Earliest time the next job becomes ready: `now` if anything already
    /// is, else the smallest pending `run_after`, else `None`.
    pub fn first_job_time(&self) -> Result<Option<DateTime<Utc>>, JobQueueError> {
        let conn = self.conn.lock().unwrap();
        let any_ready: bool = conn
            .query_row("SELECT 1 FROM job WHERE ready = 1 LIMIT 1", [], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if any_ready {
            return Ok(Some(self.clock.now()));
        }
        let min_run_after: Option<i64> = conn
            .query_row(
                "SELECT MIN(run_after) FROM job WHERE ready = 0 AND run_after IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let now = self.clock.now();
        Ok(min_run_after
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .map(|run_after| now.max(run_after)))
    }
}

/// Sets `start_from_most_recent` to whether `job_id` was, at this moment, the
/// unique oldest ready job (priority/run_after/id ascending). A no-op if the
/// job is gone or was never ready.
fn update_start_from_most_recent(tx: &rusqlite::Transaction, job_id: i64) -> Result<(), rusqlite::Error> {
    let ready: Option<i32> = tx
        .query_row("SELECT ready FROM job WHERE id = ?1", params![job_id], |row| row.get(0))
        .optional()?;
    let was_ready = match ready {
        Some(r) => r != 0,
        None => return Ok(()),
    };
    if !was_ready {
        return Ok(());
    }
    let first_ready_id: Option<i64> = tx
        .query_row(
            "SELECT id FROM job WHERE ready = 1 ORDER BY priority ASC, run_after ASC, id ASC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let removing_oldest = first_ready_id == Some(job_id);
    tx.execute(
        "INSERT INTO job_flags (key, value) VALUES ('start_from_most_recent', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![if removing_oldest { "1" } else { "0" }],
    )?;
    Ok(())
}

fn insert_one(
    tx: &rusqlite::Transaction,
    job: &Job,
    mode: InsertMode,
    now: DateTime<Utc>,
) -> Result<i64, JobQueueError> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM job WHERE handler = ?1 AND key = ?2 ORDER BY id ASC LIMIT 1",
            params![job.handler, job.key],
            |row| row.get(0),
        )
        .optional()?;

    match (mode, existing) {
        (InsertMode::IgnoreIfExists, Some(id)) => return Ok(id),
        (InsertMode::OverwriteIfExists, Some(_)) => {
            tx.execute(
                "DELETE FROM job WHERE handler = ?1 AND key = ?2",
                params![job.handler, job.key],
            )?;
        }
        _ => {}
    }

    let ready = job.run_after.map(|ra| ra <= now).unwrap_or(true);
    let params_json = serde_json::to_string(&job.parameters).unwrap_or_default();
    let result_json = serde_json::to_string(&job.last_attempt_result).unwrap_or_default();

    tx.execute(
        "INSERT INTO job (handler, key, priority, inserted_on, run_after, ready, parameters,
            last_attempt, last_attempt_result)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            job.handler,
            job.key,
            job.priority,
            job.inserted_on.timestamp(),
            job.run_after.map(|t| t.timestamp()),
            ready as i32,
            params_json,
            job.last_attempt.map(|t| t.timestamp()),
            result_json,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn row_to_job(row: &rusqlite::Row) -> Result<Job, rusqlite::Error> {
    let run_after: Option<i64> = row.get(5)?;
    let last_attempt: Option<i64> = row.get(7)?;
    let parameters_json: Option<String> = row.get(6)?;
    let result_json: Option<String> = row.get(8)?;

    Ok(Job {
        id: row.get(0)?,
        handler: row.get(1)?,
        key: row.get(2)?,
        priority: row.get(3)?,
        inserted_on: DateTime::<Utc>::from_timestamp(row.get(4)?, 0).unwrap_or_default(),
        run_after: run_after.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        parameters: parameters_json
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(Value::Null),
        last_attempt: last_attempt.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        last_attempt_result: result_json
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikibots_domain::FixedClock;

    fn open_test_queue(now: DateTime<Utc>) -> JobQueue {
        JobQueue::open(":memory:", Arc::new(FixedClock::new(now))).unwrap()
    }

    #[test]
    fn ignore_if_exists_returns_existing_id_and_leaves_row_unchanged() {
        let now = Utc::now();
        let q = open_test_queue(now);
        let id1 = q.insert(Job::new("t", "A", 0, now), InsertMode::IgnoreDups).unwrap();
        let id2 = q
            .insert(Job::new("t", "A", 5, now), InsertMode::IgnoreIfExists)
            .unwrap();
        assert_eq!(id1, id2);

        let job = q.get_by_handler_and_key("t", "A").unwrap().unwrap();
        assert_eq!(job.priority, 0, "row must be unchanged, not overwritten");
    }

    #[test]
    fn overwrite_if_exists_replaces_the_row() {
        let now = Utc::now();
        let q = open_test_queue(now);
        q.insert(Job::new("t", "A", 0, now), InsertMode::IgnoreDups).unwrap();
        q.insert(Job::new("t", "A", 9, now), InsertMode::OverwriteIfExists).unwrap();

        let job = q.get_by_handler_and_key("t", "A").unwrap().unwrap();
        assert_eq!(job.priority, 9);
    }

    #[test]
    fn insert_rejects_empty_handler() {
        let now = Utc::now();
        let q = open_test_queue(now);
        let err = q.insert(Job::new("", "A", 0, now), InsertMode::IgnoreDups);
        assert!(err.is_err());
    }

    /// Scenario R1 from the job-runner fairness design: nine jobs across
    /// three priorities, visited oldest/newest-interleaved within each
    /// priority level, lowest priority first.
    #[test]
    fn enumerate_ready_visits_oldest_newest_interleaved_per_priority() {
        let t0 = Utc::now();
        let q = open_test_queue(t0);
        let inserts = [
            ("A", 0, 0),
            ("B", 0, 1),
            ("C", 1, 2),
            ("D", 2, 3),
            ("F", 1, 4),
            ("G", 0, 5),
            ("H", 1, 6),
            ("I", 0, 7),
            ("J", 0, 8),
        ];
        for (key, priority, offset) in inserts {
            let ts = t0 + chrono::Duration::seconds(offset);
            // `run_after` stays `None` (ready immediately); insertion order
            // (reflected in ascending `id`) is what the interleave orders by.
            let job = Job::new("t", key, priority, ts);
            q.insert(job, InsertMode::IgnoreDups).unwrap();
        }

        let mut visited = Vec::new();
        q.enumerate_ready(|job| {
            visited.push(job.key.clone());
            EnumerateControl::Continue
        })
        .unwrap();

        assert_eq!(
            visited,
            vec!["A", "J", "B", "I", "G", "C", "H", "F", "D"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn lower_priority_number_is_visited_before_higher() {
        let now = Utc::now();
        let q = open_test_queue(now);
        q.insert(Job::new("t", "low-urgency", 5, now), InsertMode::IgnoreDups).unwrap();
        q.insert(Job::new("t", "high-urgency", 0, now), InsertMode::IgnoreDups)
            .unwrap();

        let mut visited = Vec::new();
        q.enumerate_ready(|job| {
            visited.push(job.key.clone());
            EnumerateControl::Continue
        })
        .unwrap();
        assert_eq!(visited, vec!["high-urgency", "low-urgency"]);
    }

    #[test]
    fn jobs_scheduled_in_the_future_are_not_ready() {
        let now = Utc::now();
        let q = open_test_queue(now);
        let future = Job::new("t", "later", 0, now).with_run_after(now + chrono::Duration::hours(1));
        q.insert(future, InsertMode::IgnoreDups).unwrap();

        let mut visited = Vec::new();
        q.enumerate_ready(|job| {
            visited.push(job.key.clone());
            EnumerateControl::Continue
        })
        .unwrap();
        assert!(visited.is_empty());
    }

    #[test]
    fn reschedule_many_updates_run_after_and_last_attempt_result() {
        let now = Utc::now();
        let q = open_test_queue(now);
        let id = q.insert(Job::new("t", "A", 0, now), InsertMode::IgnoreDups).unwrap();

        let mut result = Value::map();
        result.insert("unfinishedAttempts", Value::from(1i64));
        q.reschedule_many(&[RescheduleEntry {
            id,
            new_priority: None,
            new_run_after: now + chrono::Duration::minutes(5),
            new_last_attempt_result: Some(result),
        }])
        .unwrap();

        let mut visited = Vec::new();
        q.enumerate_ready(|job| {
            visited.push(job.key.clone());
            EnumerateControl::Continue
        })
        .unwrap();
        assert!(visited.is_empty(), "rescheduled job must not be ready yet");
    }

    /// Scenario R3: removing the unique oldest ready job at a priority flips
    /// the fairness flag, so the next pass visits the newest job of that
    /// priority before its oldest survivor.
    #[test]
    fn removing_the_unique_oldest_ready_job_flips_fairness_to_newest_first() {
        let now = Utc::now();
        let q = open_test_queue(now);
        let id_a = q.insert(Job::new("t", "A", 0, now), InsertMode::IgnoreDups).unwrap();
        q.insert(Job::new("t", "B", 0, now), InsertMode::IgnoreDups).unwrap();
        q.insert(Job::new("t", "C", 0, now), InsertMode::IgnoreDups).unwrap();

        // Promote to ready and confirm A is visited first (default order).
        let mut first_pass = Vec::new();
        q.enumerate_ready(|job| {
            first_pass.push(job.key.clone());
            EnumerateControl::Continue
        })
        .unwrap();
        assert_eq!(first_pass[0], "A");

        q.remove(id_a).unwrap();
        assert!(q.start_from_most_recent().unwrap());

        let mut second_pass = Vec::new();
        q.enumerate_ready(|job| {
            second_pass.push(job.key.clone());
            EnumerateControl::Continue
        })
        .unwrap();
        assert_eq!(second_pass[0], "C", "newest survivor must come first after the flip");
    }

    #[test]
    fn first_job_time_reports_now_when_something_is_ready() {
        let now = Utc::now();
        let q = open_test_queue(now);
        q.insert(Job::new("t", "A", 0, now), InsertMode::IgnoreDups).unwrap();
        // Promote.
        q.enumerate_ready(|_| EnumerateControl::Halt).unwrap();
        assert_eq!(q.first_job_time().unwrap(), Some(now));
    }

    #[test]
    fn first_job_time_reports_smallest_pending_run_after() {
        let now = Utc::now();
        let q = open_test_queue(now);
        let future = now + chrono::Duration::hours(2);
        q.insert(
            Job::new("t", "A", 0, now).with_run_after(future),
            InsertMode::IgnoreDups,
        )
        .unwrap();
        assert_eq!(q.first_job_time().unwrap(), Some(future));
    }
}
