//! Durable local mirror of a remote recent-changes stream, with a
//! restartable, gap-free cursor interface over it (SQLite-backed).

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use wikibots_domain::change::{ChangeKind, LogKind, RawChange};
use wikibots_domain::types::{Namespace, Title};
use wikibots_domain::Clock;

#[derive(Debug, Error)]
pub enum ChangelogError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("source: {0}")]
    Source(#[from] SourceError),
}

#[derive(Debug, Error)]
#[error("change source failed: {0}")]
pub struct SourceError(pub String);

/// A collaborator able to deliver changes from a given timestamp forward,
/// oldest-first. The production implementation is the wiki client's
/// `list_recent_changes`; tests substitute a fixture implementing the same
/// trait.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn fetch_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RawChange>, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerateControl {
    Continue,
    Halt,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeLogOptions {
    pub kind_mask: Option<Vec<ChangeKind>>,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    /// Opaque `"rc|<change_id>"` cursor. Empty means uninitialized. Updated
    /// in place on return to the id of the last row delivered.
    pub continue_token: String,
}

fn parse_token(token: &str) -> Option<i64> {
    token.strip_prefix("rc|").and_then(|s| s.parse().ok())
}

fn format_token(change_id: i64) -> String {
    format!("rc|{}", change_id)
}

pub struct ChangeLog {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    overlap: ChronoDuration,
    retention: ChronoDuration,
    seconds_to_ignore: Option<i64>,
}

impl ChangeLog {
    pub fn open(path: impl AsRef<std::path::Path>, clock: Arc<dyn Clock>) -> Result<Self, ChangelogError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS changelog (
                change_id INTEGER PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                namespace INTEGER NOT NULL,
                title TEXT NOT NULL,
                user TEXT NOT NULL,
                comment TEXT NOT NULL,
                kind TEXT NOT NULL,
                revid INTEGER,
                old_revid INTEGER,
                size INTEGER,
                log_id INTEGER,
                log_kind TEXT,
                log_action TEXT,
                log_params TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_changelog_timestamp ON changelog(timestamp);
             CREATE INDEX IF NOT EXISTS idx_changelog_log ON changelog(change_id) WHERE kind='log';",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            overlap: ChronoDuration::seconds(60),
            retention: ChronoDuration::days(35),
            seconds_to_ignore: None,
        })
    }

    pub fn with_overlap(mut self, overlap: ChronoDuration) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_retention(mut self, retention: ChronoDuration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_seconds_to_ignore(mut self, seconds: Option<u32>) -> Self {
        self.seconds_to_ignore = seconds.map(i64::from);
        self
    }

    fn read_max(conn: &Connection) -> Result<Option<(i64, i64)>, rusqlite::Error> {
        conn.query_row(
            "SELECT change_id, timestamp FROM changelog ORDER BY change_id DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
    }

    /// Pulls new rows from `source` and commits them under the ordering and
    /// cutoff rules described at the module level. Runs entirely inside one
    /// exclusive transaction once the (async) source round trip completes.
    pub async fn update_from_source(&self, source: &dyn ChangeSource) -> Result<(), ChangelogError> {
        let now_wall = self.clock.now();
        let max_before = {
            let conn = self.conn.lock().unwrap();
            Self::read_max(&conn)?
        };

        let changes = match max_before {
            None => {
                // Local table empty: pull the overlap window and keep only the
                // highest id, to seed the high-water mark without ingesting
                // history.
                let since = now_wall - self.overlap;
                let mut fetched = source.fetch_since(since, 0).await?;
                fetched.sort_by_key(|c| c.change_id);
                match fetched.pop() {
                    Some(latest) => vec![latest],
                    None => Vec::new(),
                }
            }
            Some((_, max_ts)) => {
                let max_ts = DateTime::<Utc>::from_timestamp(max_ts, 0).unwrap_or(now_wall);
                source.fetch_since(max_ts - self.overlap, 0).await?
            }
        };

        if changes.is_empty() {
            return Ok(());
        }

        let cutoff_id = match self.seconds_to_ignore {
            Some(secs) => {
                let floor = now_wall - ChronoDuration::seconds(secs);
                changes
                    .iter()
                    .filter(|c| c.timestamp > floor)
                    .map(|c| c.change_id)
                    .min()
                    .map(|min_ignored| min_ignored - 1)
                    .unwrap_or(i64::MAX)
            }
            None => i64::MAX,
        };

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let max_id = max_before.map(|(id, _)| id).unwrap_or(i64::MIN);

        for change in changes.iter().filter(|c| c.change_id <= cutoff_id) {
            let exists: bool = tx
                .query_row(
                    "SELECT 1 FROM changelog WHERE change_id = ?1",
                    params![change.change_id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);

            if change.change_id <= max_id {
                if exists {
                    continue;
                }
                tracing::warn!(change_id = change.change_id, "reordered insertion skipped");
                continue;
            }

            insert_change(&tx, change)?;
        }

        if let Some((_, newest_ts)) = Self::read_max(&tx)? {
            let cutoff_ts = newest_ts - self.retention.num_seconds();
            tx.execute("DELETE FROM changelog WHERE timestamp < ?1", params![cutoff_ts])?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Delivers rows in strictly increasing `change_id` order per the
    /// selection and stopping rules described at the module level, advancing
    /// `options.continue_token` as it goes.
    pub fn enumerate(
        &self,
        options: &mut ChangeLogOptions,
        mut callback: impl FnMut(&RawChange) -> EnumerateControl,
    ) -> Result<(), ChangelogError> {
        let conn = self.conn.lock().unwrap();

        let start_after: i64 = if !options.continue_token.is_empty() {
            parse_token(&options.continue_token).unwrap_or(i64::MIN)
        } else if let Some(start_ts) = options.start_timestamp {
            // Inclusive of start_timestamp: start one below the first row at
            // that timestamp.
            conn.query_row(
                "SELECT MIN(change_id) - 1 FROM changelog WHERE timestamp >= ?1",
                params![start_ts.timestamp()],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten()
            .unwrap_or(i64::MAX)
        } else {
            Self::read_max(&conn)?.map(|(id, _)| id).unwrap_or(i64::MIN)
        };

        let floor_ts = options.start_timestamp.map(|t| t.timestamp()).unwrap_or(i64::MIN);

        let mut stmt = conn.prepare(
            "SELECT change_id, timestamp, namespace, title, user, comment, kind, revid,
                    old_revid, size, log_id, log_kind, log_action, log_params
             FROM changelog
             WHERE change_id > ?1 AND timestamp >= ?2
             ORDER BY change_id ASC",
        )?;
        let mut rows = stmt.query(params![start_after, floor_ts])?;

        let mut delivered = 0u32;
        let mut last_delivered: Option<i64> = None;

        while let Some(row) = rows.next()? {
            let change = row_to_change(row)?;

            if let Some(end_ts) = options.end_timestamp {
                if change.timestamp > end_ts {
                    break;
                }
            }
            if let Some(mask) = &options.kind_mask {
                if !mask.contains(&change.kind) {
                    continue;
                }
            }

            last_delivered = Some(change.change_id);
            let control = callback(&change);
            delivered += 1;

            if control == EnumerateControl::Halt {
                break;
            }
            if let Some(limit) = options.limit {
                if delivered >= limit {
                    break;
                }
            }
        }

        if let Some(id) = last_delivered {
            options.continue_token = format_token(id);
        } else if options.continue_token.is_empty() && options.start_timestamp.is_none() {
            if let Some((max_id, _)) = Self::read_max(&conn)? {
                options.continue_token = format_token(max_id);
            }
        }

        Ok(())
    }

    /// Titles touched between `start` and `end`, optionally excluding one user.
    pub fn recently_updated_pages(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        excluded_user: Option<&str>,
    ) -> Result<HashSet<Title>, ChangelogError> {
        let mut options = ChangeLogOptions {
            start_timestamp: Some(start),
            end_timestamp: Some(end),
            ..Default::default()
        };
        let mut titles = HashSet::new();
        self.enumerate(&mut options, |change| {
            if excluded_user != Some(change.user.as_str()) {
                titles.insert(change.title.clone());
            }
            EnumerateControl::Continue
        })?;
        Ok(titles)
    }

    pub fn recent_log_events(
        &self,
        kind: Option<LogKind>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawChange>, ChangelogError> {
        let mut options = ChangeLogOptions {
            kind_mask: Some(vec![ChangeKind::Log]),
            start_timestamp: Some(start),
            end_timestamp: Some(end),
            ..Default::default()
        };
        let mut events = Vec::new();
        self.enumerate(&mut options, |change| {
            if kind.is_none() || change.log_kind == kind {
                events.push(change.clone());
            }
            EnumerateControl::Continue
        })?;
        Ok(events)
    }
}

fn insert_change(tx: &rusqlite::Transaction, change: &RawChange) -> Result<(), rusqlite::Error> {
    let kind_str = match change.kind {
        ChangeKind::Edit => "edit",
        ChangeKind::NewPage => "new-page",
        ChangeKind::Log => "log",
    };
    let log_kind_str = change.log_kind.map(|k| match k {
        LogKind::Delete => "delete",
        LogKind::Upload => "upload",
        LogKind::Move => "move",
        LogKind::Import => "import",
        LogKind::Protect => "protect",
    });
    let log_params_json = change
        .log_params
        .as_ref()
        .map(|v| serde_json::to_string(v).unwrap_or_default());

    tx.execute(
        "INSERT INTO changelog (change_id, timestamp, namespace, title, user, comment, kind,
            revid, old_revid, size, log_id, log_kind, log_action, log_params)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            change.change_id,
            change.timestamp.timestamp(),
            change.title.namespace.0,
            change.title.name,
            change.user,
            change.comment,
            kind_str,
            change.new_revid,
            change.old_revid,
            change.new_size,
            change.log_id,
            log_kind_str,
            change.log_action,
            log_params_json,
        ],
    )?;
    Ok(())
}

fn row_to_change(row: &rusqlite::Row) -> Result<RawChange, rusqlite::Error> {
    let kind_str: String = row.get(6)?;
    let kind = match kind_str.as_str() {
        "new-page" => ChangeKind::NewPage,
        "log" => ChangeKind::Log,
        _ => ChangeKind::Edit,
    };
    let log_kind_str: Option<String> = row.get(11)?;
    let log_kind = log_kind_str.as_deref().and_then(|s| match s {
        "delete" => Some(LogKind::Delete),
        "upload" => Some(LogKind::Upload),
        "move" => Some(LogKind::Move),
        "import" => Some(LogKind::Import),
        "protect" => Some(LogKind::Protect),
        _ => None,
    });
    let log_params_json: Option<String> = row.get(13)?;
    let log_params = log_params_json
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
        .map(wikibots_domain::Value::from);

    let ns = Namespace(row.get(2)?);
    let name: String = row.get(3)?;

    Ok(RawChange {
        change_id: row.get(0)?,
        timestamp: DateTime::<Utc>::from_timestamp(row.get(1)?, 0).unwrap_or_default(),
        kind,
        title: Title::new(ns, name),
        user: row.get(4)?,
        comment: row.get(5)?,
        old_revid: row.get(8)?,
        new_revid: row.get(7)?,
        new_size: row.get(9)?,
        log_id: row.get(10)?,
        log_kind,
        log_action: row.get(12)?,
        log_params,
    })
}
