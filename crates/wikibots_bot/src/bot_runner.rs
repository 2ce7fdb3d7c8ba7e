//! Daemon wiring: replicate recent changes, classify them into jobs, and
//! drain the job queue against a registered set of handlers.
//!
//! This is the "bot handler" box in the data-flow diagram: `sync` walks
//! `ChangeLog::enumerate` and feeds each row to a [`ChangeClassifier`], which
//! decides whether the event is this bot's concern and, if so, what job to
//! enqueue; `run` is a thin wrapper over [`wikibots_runner::run_jobs`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use wikibots_client::client::MediaWikiClient;
use wikibots_domain::change::RawChange;
use wikibots_domain::types::{Namespace, Title};
use wikibots_domain::Clock;
use wikibots_engine::page_mutator::{PageMutator, PageMutatorError, WriteFlags};
use wikibots_runner::{
    run_jobs, ErrorLevel, HandlerRegistry, JobExecutionError, JobHandler, JobRunnerError,
    RunJobsOptions,
};
use wikibots_storage::{
    ChangeLog, ChangeLogEnumerateControl, ChangeLogOptions, ChangeSource, ChangelogError,
    InsertMode, Job, JobQueue, JobQueueError, SourceError, StateStore, StorageError,
};

use crate::config::BotConfig;
use crate::report::{RunReport, SyncReport};

#[derive(Debug, Error)]
pub enum BotError {
    #[error("changelog: {0}")]
    Changelog(#[from] ChangelogError),
    #[error("job queue: {0}")]
    JobQueue(#[from] JobQueueError),
    #[error("job runner: {0}")]
    JobRunner(#[from] JobRunnerError),
    #[error("state store: {0}")]
    State(#[from] StorageError),
}

/// Turns one recent-changes row into a job to enqueue, or `None` to ignore
/// it. Implementations encode what a specific bot cares about (a page move,
/// an unanswered talk-page message, a monthly rollover, ...); the daemon
/// itself is agnostic to that policy.
pub trait ChangeClassifier: Send + Sync {
    fn classify(&self, change: &RawChange) -> Option<Job>;
}

/// Adapts any [`MediaWikiClient`] to the changelog's [`ChangeSource`] trait,
/// so `BotDaemon::sync` can replicate straight from the live wiki.
pub struct WikiChangeSource<C: MediaWikiClient> {
    client: Arc<C>,
}

impl<C: MediaWikiClient> WikiChangeSource<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: MediaWikiClient> ChangeSource for WikiChangeSource<C> {
    async fn fetch_since(&self, since: DateTime<Utc>, limit: u32) -> Result<Vec<RawChange>, SourceError> {
        self.client
            .list_recent_changes(since, limit)
            .await
            .map_err(|e| SourceError(e.to_string()))
    }
}

/// Wires the three core subsystems together for one bot: replicate recent
/// changes into a local [`ChangeLog`], classify them into jobs on a
/// [`JobQueue`], and drain that queue with [`wikibots_runner::run_jobs`].
pub struct BotDaemon {
    config: BotConfig,
    changelog: ChangeLog,
    job_queue: JobQueue,
    state_store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl BotDaemon {
    pub fn new(
        config: BotConfig,
        changelog: ChangeLog,
        job_queue: JobQueue,
        state_store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            changelog,
            job_queue,
            state_store,
            clock,
        }
    }

    /// Replicates new recent-changes rows from `source`, classifies each
    /// with `classifier`, and enqueues the resulting jobs. Persists the
    /// resume token via the state store regardless of whether any jobs
    /// resulted, so a restart doesn't replay already-seen changes.
    pub async fn sync(
        &self,
        source: &dyn ChangeSource,
        classifier: &dyn ChangeClassifier,
    ) -> Result<SyncReport, BotError> {
        let start = self.clock.now();
        self.changelog.update_from_source(source).await?;

        let mut state = self.state_store.load(&self.config.bot_id).await?;
        let mut options = ChangeLogOptions {
            continue_token: state.rc_token.clone(),
            ..Default::default()
        };

        let mut changes_fetched = 0usize;
        let mut jobs = Vec::new();
        let log_every_n = self.config.log_every_n.max(1) as usize;
        self.changelog.enumerate(&mut options, |change| {
            changes_fetched += 1;
            if let Some(job) = classifier.classify(change) {
                jobs.push(job);
            }
            if changes_fetched % log_every_n == 0 {
                tracing::info!(changes_fetched, "sync progress");
            }
            ChangeLogEnumerateControl::Continue
        })?;

        let jobs_enqueued = jobs.len();
        if !self.config.dry_run && !jobs.is_empty() {
            self.job_queue.insert_many(jobs, InsertMode::IgnoreDups)?;
        }

        state.rc_token = options.continue_token;
        if !self.config.dry_run {
            self.state_store.save(&state).await?;
        }

        let end = self.clock.now();
        Ok(SyncReport {
            changes_fetched,
            jobs_enqueued,
            resume_token: state.rc_token,
            start_time: start,
            end_time: end,
            elapsed_secs: (end - start).num_milliseconds() as f64 / 1000.0,
        })
    }

    /// Drains ready jobs from the queue against `handlers` until the queue
    /// is empty or `config.max_jobs_per_run` queue reads are spent.
    pub async fn run(&self, handlers: &HandlerRegistry) -> Result<RunReport, BotError> {
        let start = self.clock.now();
        let options = RunJobsOptions {
            max_count: self.config.max_jobs_per_run,
            backoff_randomness: 0.5,
            dry_run: self.config.dry_run,
        };
        run_jobs(&self.job_queue, handlers, &options, &self.clock).await?;
        let end = self.clock.now();
        Ok(RunReport {
            max_jobs_per_run: self.config.max_jobs_per_run,
            dry_run: self.config.dry_run,
            start_time: start,
            end_time: end,
            elapsed_secs: (end - start).num_milliseconds() as f64 / 1000.0,
        })
    }
}

/// A [`JobHandler`] that treats a job's `key` as a page title and applies
/// `transform` to it through a [`PageMutator`], removing the job on success.
/// Bridges the generic job-runner to the page-mutation layer; a concrete
/// bot supplies `transform` (and, typically, a [`crate::bot_runner::ChangeClassifier`]
/// that enqueues jobs for this handler's `handler` prefix).
pub struct EditJobHandler<C: MediaWikiClient, F> {
    mutator: PageMutator<C>,
    namespace: Namespace,
    flags: WriteFlags,
    transform: F,
}

impl<C, F> EditJobHandler<C, F>
where
    C: MediaWikiClient,
    F: Fn(&mut String, &mut String) + Send + Sync,
{
    pub fn new(mutator: PageMutator<C>, namespace: Namespace, flags: WriteFlags, transform: F) -> Self {
        Self { mutator, namespace, flags, transform }
    }
}

#[async_trait]
impl<C, F> JobHandler for EditJobHandler<C, F>
where
    C: MediaWikiClient,
    F: Fn(&mut String, &mut String) + Send + Sync,
{
    async fn run(&self, job: &Job, queue: &JobQueue, dry_run: bool) -> Result<(), JobExecutionError> {
        let title = Title::new(self.namespace, job.key.clone());

        if dry_run {
            tracing::info!(title = %title, "dry-run: would edit");
            return Ok(());
        }

        self.mutator
            .edit(&title, |content, summary| (self.transform)(content, summary), self.flags)
            .await
            .map_err(|e| match e {
                PageMutatorError::EmergencyStopError => {
                    JobExecutionError::new(ErrorLevel::Warning, "emergency stop triggered")
                        .with_min_retry_delay(chrono::Duration::hours(1))
                }
                other => JobExecutionError::from_source(ErrorLevel::Error, other.to_string(), "PageMutator", "edit"),
            })?;

        queue
            .remove(job.id)
            .map_err(|e| JobExecutionError::new(ErrorLevel::Error, e.to_string()))
    }
}
