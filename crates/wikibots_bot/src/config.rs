use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for one bot's daemon cycle (`sync` + `run`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Stable identifier this bot's resume state is persisted under.
    pub bot_id: String,

    /// Bot account username: used for `{{nobots}}`/`{{bots}}` exclusion
    /// checks and as the emergency-stop talk page owner.
    pub bot_name: String,

    /// `{{bots|optout=...}}` tag this bot's edits fall under. Empty means the
    /// bot doesn't participate in per-message-type opt-out.
    #[serde(default)]
    pub message_type: String,

    /// Caps the number of queue reads one `run` invocation will spend
    /// (`RunJobsOptions::max_count`), not a cap on jobs completed, since one
    /// batch can cover several jobs per read.
    #[serde(default = "default_max_jobs_per_run")]
    pub max_jobs_per_run: i64,

    /// Show what would be enqueued or run without writing to the wiki, the
    /// job queue, or the persisted resume token.
    #[serde(default)]
    pub dry_run: bool,

    /// Emit a progress log line every N changes scanned during `sync`.
    #[serde(default = "default_log_every_n")]
    pub log_every_n: u32,

    /// Directory holding the changelog and job-queue SQLite files and the
    /// state-store JSON.
    pub data_dir: PathBuf,
}

fn default_max_jobs_per_run() -> i64 {
    100
}

fn default_log_every_n() -> u32 {
    50
}

impl BotConfig {
    pub fn new(
        bot_id: impl Into<String>,
        bot_name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            bot_name: bot_name.into(),
            message_type: String::new(),
            max_jobs_per_run: default_max_jobs_per_run(),
            dry_run: false,
            log_every_n: default_log_every_n(),
            data_dir: data_dir.into(),
        }
    }

    #[must_use]
    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    #[must_use]
    pub fn with_max_jobs_per_run(mut self, n: i64) -> Self {
        self.max_jobs_per_run = n;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_log_every_n(mut self, n: u32) -> Self {
        self.log_every_n = n;
        self
    }

    pub fn changelog_path(&self) -> PathBuf {
        self.data_dir.join("changelog.sqlite")
    }

    pub fn jobqueue_path(&self) -> PathBuf {
        self.data_dir.join("jobqueue.sqlite")
    }

    pub fn state_dir(&self) -> &Path {
        &self.data_dir
    }
}
