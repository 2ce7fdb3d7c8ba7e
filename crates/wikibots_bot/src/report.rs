use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one `BotDaemon::sync` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Recent-changes rows delivered by the changelog reader this call.
    pub changes_fetched: usize,

    /// Jobs the classifier produced and (unless `dry_run`) enqueued.
    pub jobs_enqueued: usize,

    /// The changelog resume token after this call, persisted to the state
    /// store unless `dry_run`.
    pub resume_token: String,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_secs: f64,
}

impl SyncReport {
    /// Changes the classifier looked at but didn't turn into a job.
    pub fn changes_skipped(&self) -> usize {
        self.changes_fetched.saturating_sub(self.jobs_enqueued)
    }

    pub fn to_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("=== Sync Summary ===\n");
        summary.push_str(&format!("Started:  {}\n", self.start_time.format("%Y-%m-%d %H:%M:%S UTC")));
        summary.push_str(&format!("Finished: {}\n", self.end_time.format("%Y-%m-%d %H:%M:%S UTC")));
        summary.push_str(&format!("Duration: {:.2} seconds\n", self.elapsed_secs));
        summary.push_str(&format!("Changes fetched: {}\n", self.changes_fetched));
        summary.push_str(&format!("Jobs enqueued:   {}\n", self.jobs_enqueued));
        summary.push_str(&format!("Changes skipped: {}\n", self.changes_skipped()));
        summary.push_str(&format!("Resume token:    {}\n", self.resume_token));
        summary
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Outcome of one `BotDaemon::run` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// `RunJobsOptions::max_count` the run was bounded by.
    pub max_jobs_per_run: i64,
    pub dry_run: bool,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn to_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("=== Run Summary ===\n");
        summary.push_str(&format!("Started:  {}\n", self.start_time.format("%Y-%m-%d %H:%M:%S UTC")));
        summary.push_str(&format!("Finished: {}\n", self.end_time.format("%Y-%m-%d %H:%M:%S UTC")));
        summary.push_str(&format!("Duration: {:.2} seconds\n", self.elapsed_secs));
        summary.push_str(&format!("Max queue reads: {}\n", self.max_jobs_per_run));
        summary.push_str(&format!("Mode:            {}\n", if self.dry_run { "dry-run" } else { "live" }));
        summary
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sync() -> SyncReport {
        let start = Utc::now();
        SyncReport {
            changes_fetched: 12,
            jobs_enqueued: 5,
            resume_token: "rc|42".to_string(),
            start_time: start,
            end_time: start + chrono::Duration::seconds(3),
            elapsed_secs: 3.0,
        }
    }

    #[test]
    fn changes_skipped_is_the_difference() {
        assert_eq!(sample_sync().changes_skipped(), 7);
    }

    #[test]
    fn sync_summary_includes_counts_and_token() {
        let summary = sample_sync().to_summary();
        assert!(summary.contains("Changes fetched: 12"));
        assert!(summary.contains("Jobs enqueued:   5"));
        assert!(summary.contains("Resume token:    rc|42"));
    }

    #[test]
    fn sync_report_json_round_trips() {
        let report = sample_sync();
        let json = report.to_json().unwrap();
        let parsed: SyncReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.changes_fetched, report.changes_fetched);
        assert_eq!(parsed.resume_token, report.resume_token);
    }

    #[test]
    fn run_summary_shows_dry_run_mode() {
        let start = Utc::now();
        let report = RunReport {
            max_jobs_per_run: 10,
            dry_run: true,
            start_time: start,
            end_time: start + chrono::Duration::seconds(1),
            elapsed_secs: 1.0,
        };
        let summary = report.to_summary();
        assert!(summary.contains("Mode:            dry-run"));
        assert!(summary.contains("Max queue reads: 10"));
    }
}
