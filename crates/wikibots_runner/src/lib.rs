//! Batched priority job scheduler: pulls ready work from a [`JobQueue`],
//! dispatches it to registered handlers in per-handler batches, and
//! reschedules failures with exponential backoff.
//!
//! `now()` is threaded through explicitly via an injected [`Clock`], the same
//! capability [`wikibots_storage::ChangeLog`] and [`wikibots_storage::JobQueue`]
//! already take, rather than a process-wide mutable clock.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{event, instrument, Level};
use wikibots_domain::{Clock, Value};
use wikibots_storage::{
    Job, JobQueue, JobQueueEnumerateControl as EnumerateControl, JobQueueError, RescheduleEntry,
};

/// ~1000 years: "do not retry for the practical lifetime of the system."
pub fn infinite_delay() -> ChronoDuration {
    ChronoDuration::days(365 * 1000)
}

fn is_infinite(delay: ChronoDuration) -> bool {
    delay >= infinite_delay()
}

/// The `run_after` sentinel used once a job is rescheduled with
/// [`infinite_delay`], far enough out that it never becomes ready again in
/// practice.
fn infinite_run_after() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Info,
    Warning,
    Error,
}

/// Raised by a [`JobHandler`] to signal a failed attempt. The runner inspects
/// its fields rather than matching on error types: `error_level` picks the log
/// severity, `new_priority` and `min_retry_delay` steer rescheduling.
#[derive(Debug, Clone)]
pub struct JobExecutionError {
    pub error_level: ErrorLevel,
    pub description: String,
    pub structured_info: Value,
    pub new_priority: Option<i32>,
    pub min_retry_delay: ChronoDuration,
}

impl JobExecutionError {
    pub fn new(error_level: ErrorLevel, description: impl Into<String>) -> Self {
        Self {
            error_level,
            description: description.into(),
            structured_info: Value::map(),
            new_priority: None,
            min_retry_delay: ChronoDuration::zero(),
        }
    }

    /// Builds `structured_info` as `{source}Error: {code, description}`, the
    /// shape handlers across this workspace use for `last_attempt_result.failure`.
    pub fn from_source(
        error_level: ErrorLevel,
        description: impl Into<String>,
        source: &str,
        code: impl Into<String>,
    ) -> Self {
        let description = description.into();
        let mut inner = Value::map();
        inner.insert("code", Value::from(code.into()));
        inner.insert("description", Value::from(description.clone()));
        let mut structured_info = Value::map();
        structured_info.insert(format!("{source}Error"), inner);
        Self {
            error_level,
            description,
            structured_info,
            new_priority: None,
            min_retry_delay: ChronoDuration::zero(),
        }
    }

    pub fn with_new_priority(mut self, priority: i32) -> Self {
        self.new_priority = Some(priority);
        self
    }

    pub fn with_min_retry_delay(mut self, delay: ChronoDuration) -> Self {
        self.min_retry_delay = delay;
        self
    }
}

/// A unit of work a [`JobQueue`] entry is dispatched to. `start_batch`/`end_batch`
/// bracket a whole batch (e.g. to open one HTTP session for N jobs); `run`
/// handles a single job. Default `max_batch_size` of 1 means no batching.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn max_batch_size(&self) -> usize {
        1
    }

    async fn start_batch(&self, _jobs: &[Job], _queue: &JobQueue) -> Result<(), JobExecutionError> {
        Ok(())
    }

    async fn run(&self, job: &Job, queue: &JobQueue, dry_run: bool) -> Result<(), JobExecutionError>;

    async fn end_batch(&self, _queue: &JobQueue) -> Result<(), JobExecutionError> {
        Ok(())
    }
}

pub type HandlerRegistry = HashMap<String, Arc<dyn JobHandler>>;

#[derive(Debug, Clone, Copy)]
pub struct RunJobsOptions {
    pub max_count: i64,
    pub backoff_randomness: f64,
    pub dry_run: bool,
}

impl Default for RunJobsOptions {
    fn default() -> Self {
        Self {
            max_count: 10,
            backoff_randomness: 0.5,
            dry_run: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum JobRunnerError {
    #[error("job queue: {0}")]
    Queue(#[from] JobQueueError),
}

/// `d · (1 + uniform(0, r))`, rounded to whole seconds.
pub fn randomize(delay: ChronoDuration, randomness: f64) -> ChronoDuration {
    let jitter = if randomness > 0.0 {
        rand::thread_rng().gen_range(0.0..randomness)
    } else {
        0.0
    };
    ChronoDuration::seconds((delay.num_seconds() as f64 * (1.0 + jitter)) as i64)
}

/// Repeatedly pulls one batch of ready jobs at a time and dispatches it, until
/// `options.max_count` queue reads are spent or the queue reports no ready job.
#[instrument(skip(queue, handlers, clock), fields(max_count = options.max_count))]
pub async fn run_jobs(
    queue: &JobQueue,
    handlers: &HandlerRegistry,
    options: &RunJobsOptions,
    clock: &Arc<dyn Clock>,
) -> Result<(), JobRunnerError> {
    let mut max_count = options.max_count;
    loop {
        if max_count <= 0 {
            tracing::info!("maximum number of queue reads reached, exiting");
            break;
        }
        let did_work = run_one_batch(queue, handlers, options, clock, &mut max_count).await?;
        if !did_work {
            tracing::info!("no job left in the queue, exiting");
            break;
        }
    }
    Ok(())
}

#[instrument(skip(queue, handlers, clock, max_count))]
async fn run_one_batch(
    queue: &JobQueue,
    handlers: &HandlerRegistry,
    options: &RunJobsOptions,
    clock: &Arc<dyn Clock>,
    max_count: &mut i64,
) -> Result<bool, JobRunnerError> {
    let mut jobs: Vec<Job> = Vec::new();
    let mut handler: Option<Arc<dyn JobHandler>> = None;
    let mut handler_batch_size: usize = 1000; // default for an unregistered handler
    let mut skipped = 0u32;

    queue.enumerate_ready(|job| {
        if jobs.is_empty() {
            if let Some(found) = handlers.get(job.handler_prefix()) {
                handler = Some(Arc::clone(found));
                handler_batch_size = found.max_batch_size();
            }
        } else {
            let first = &jobs[0];
            if job.priority != first.priority {
                return EnumerateControl::Halt;
            }
            if job.handler != first.handler {
                skipped += 1;
                return if skipped < 10 { EnumerateControl::Continue } else { EnumerateControl::Halt };
            }
        }
        jobs.push(job.clone());
        *max_count -= 1;
        skipped = 0;
        if *max_count > 0 && jobs.len() < handler_batch_size {
            EnumerateControl::Continue
        } else {
            EnumerateControl::Halt
        }
    })?;

    if jobs.is_empty() {
        return Ok(false);
    }

    let Some(handler) = handler else {
        for job in &jobs {
            tracing::error!(job_id = job.id, handler = %job.handler, "job with unregistered handler, dropping");
        }
        if !options.dry_run {
            let ids: Vec<i64> = jobs.iter().map(|j| j.id).collect();
            queue.remove_many(&ids)?;
        }
        return Ok(true);
    };

    // Reschedule before trying so an uncontrolled crash in handler code
    // doesn't retry the same batch in a tight loop after restart.
    if !options.dry_run {
        let now = clock.now();
        let entries: Vec<RescheduleEntry> = jobs
            .iter()
            .map(|job| reschedule_entry(job, job.last_attempt_result.clone(), "unfinishedAttempts", ChronoDuration::zero(), None, options.backoff_randomness, now))
            .collect();
        queue.reschedule_many(&entries)?;
    }

    loop {
        match handler.start_batch(&jobs, queue).await {
            Ok(()) => break,
            Err(error) => {
                if jobs.len() == 1 {
                    tracing::error!(job_id = jobs[0].id, error = %error.description, "failed to prepare job");
                    reschedule_after_failure(queue, &jobs[0], &error, options, clock)?;
                    return Ok(true);
                }
                tracing::warn!(
                    batch_size = jobs.len(),
                    handler = %jobs[0].handler,
                    error = %error.description,
                    "splitting batch after start_batch failure"
                );
                let middle = jobs.len() / 2;
                if !options.dry_run {
                    let now = clock.now();
                    let cancelled: Vec<RescheduleEntry> = jobs[middle..]
                        .iter()
                        .map(|job| RescheduleEntry {
                            id: job.id,
                            new_priority: None,
                            new_run_after: now,
                            new_last_attempt_result: Some(job.last_attempt_result.clone()),
                        })
                        .collect();
                    queue.reschedule_many(&cancelled)?;
                }
                jobs.truncate(middle);
            }
        }
    }

    for job in &jobs {
        match handler.run(job, queue, options.dry_run).await {
            Ok(()) => {
                if !options.dry_run {
                    queue.remove(job.id)?;
                }
            }
            Err(error) => {
                log_job_error(job, &error);
                reschedule_after_failure(queue, job, &error, options, clock)?;
            }
        }
    }

    if let Err(error) = handler.end_batch(queue).await {
        tracing::warn!(error = %error.description, "end_batch reported an error");
    }

    Ok(true)
}

fn log_job_error(job: &Job, error: &JobExecutionError) {
    match error.error_level {
        ErrorLevel::Info => {
            event!(Level::INFO, job_id = job.id, handler = %job.handler, error = %error.description, "rescheduling job");
        }
        ErrorLevel::Warning => {
            event!(Level::WARN, job_id = job.id, handler = %job.handler, error = %error.description, "rescheduling job");
        }
        ErrorLevel::Error => {
            event!(Level::ERROR, job_id = job.id, handler = %job.handler, error = %error.description, "job failed");
        }
    }
}

fn reschedule_after_failure(
    queue: &JobQueue,
    job: &Job,
    error: &JobExecutionError,
    options: &RunJobsOptions,
    clock: &Arc<dyn Clock>,
) -> Result<(), JobQueueError> {
    if options.dry_run {
        return Ok(());
    }
    let mut result = job.last_attempt_result.clone();
    result.remove("unfinishedAttempts");
    result.insert("failure", error.structured_info.clone());
    let now = clock.now();
    let entry = reschedule_entry(job, result, "failedAttempts", error.min_retry_delay, error.new_priority, options.backoff_randomness, now);
    queue.reschedule_many(&[entry])
}

/// Shared core of `reschedule_before_trying`/`reschedule_after_failure`:
/// increments `attempts_key.count`, doubles the previous retry delay (capped
/// at 200 days, floored at `max(3 min, min_retry_delay)`), randomizes it, and
/// computes the resulting `run_after`. `min_retry_delay == infinite_delay()`
/// instead parks the job at [`infinite_run_after`].
fn reschedule_entry(
    job: &Job,
    mut result: Value,
    attempts_key: &str,
    min_retry_delay: ChronoDuration,
    new_priority: Option<i32>,
    randomness: f64,
    now: DateTime<Utc>,
) -> RescheduleEntry {
    let mut attempts = result.get(attempts_key);
    if attempts.is_null() {
        attempts = Value::map();
    }
    let count = attempts.get_i64_or("count", 0) + 1;
    attempts.insert("count", Value::from(count));

    let run_after = if !is_infinite(min_retry_delay) {
        let lower_bound = min_retry_delay.max(ChronoDuration::minutes(3));
        let prev_delay_secs = attempts.get_i64_or("retryDelay", 0);
        let doubled = ChronoDuration::seconds(prev_delay_secs.saturating_mul(2)).min(ChronoDuration::days(200));
        let new_delay = randomize(lower_bound.max(doubled), randomness);
        attempts.insert("retryDelay", Value::from(new_delay.num_seconds()));
        now + new_delay
    } else {
        attempts.insert("retryDelay", Value::from("infinite"));
        infinite_run_after()
    };
    result.insert(attempts_key, attempts);

    RescheduleEntry {
        id: job.id,
        new_priority,
        new_run_after: run_after,
        new_last_attempt_result: Some(result),
    }
}
