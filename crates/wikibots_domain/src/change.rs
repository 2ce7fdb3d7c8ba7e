//! The shape of one row in the remote recent-changes stream, as delivered by a
//! source collaborator (the wiki client in production, a fixture in tests) and
//! as persisted by the change log.

use crate::types::Title;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeKind {
    Edit,
    NewPage,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    Delete,
    Upload,
    Move,
    Import,
    Protect,
}

/// One row of the recent-changes stream, before or after it has been committed
/// to local storage. `change_id` is only weakly monotone at the source: it can
/// arrive out of order within a short window, and `timestamp` can regress by a
/// handful of seconds relative to the previously committed maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub change_id: i64,
    pub timestamp: DateTime<Utc>,
    pub kind: ChangeKind,
    pub title: Title,
    pub user: String,
    pub comment: String,
    pub old_revid: Option<u64>,
    pub new_revid: Option<u64>,
    pub new_size: Option<u64>,
    pub log_id: Option<u64>,
    pub log_kind: Option<LogKind>,
    pub log_action: Option<String>,
    pub log_params: Option<crate::Value>,
}

impl RawChange {
    pub fn is_log(&self) -> bool {
        matches!(self.kind, ChangeKind::Log)
    }
}
