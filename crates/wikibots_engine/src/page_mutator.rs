//! Read-modify-write orchestration over the wiki API: conflict detection,
//! exclusion-template honoring, an emergency-stop check, and retry-on-conflict
//! with recomputation.

use crate::exclusion::test_bot_exclusion;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use thiserror::Error;
use wikibots_client::client::{EditRequest, MediaWikiClient};
use wikibots_client::error::MwApiError;
use wikibots_domain::clock::Clock;
use wikibots_domain::types::{RevisionId, Title};

#[derive(Debug, Error)]
pub enum PageMutatorError {
    #[error("page not found: {title}")]
    PageNotFound { title: String },
    #[error("edit conflict on {title}")]
    EditConflictError { title: String },
    #[error("page already exists: {title}")]
    PageAlreadyExistsError { title: String },
    #[error("{title} is excluded by {{{{nobots}}}} or {{{{bots}}}}")]
    NoBotsError { title: String },
    #[error("emergency stop triggered")]
    EmergencyStopError,
    #[error("refusing to write empty content to {title} without ALLOW_BLANKING")]
    BlankingRejected { title: String },
    #[error(transparent)]
    Api(#[from] MwApiError),
}

/// Behavior flags for [`PageMutator::write`] and [`PageMutator::edit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteFlags(u8);

impl WriteFlags {
    pub const ALLOW_BLANKING: WriteFlags = WriteFlags(1);
    pub const BYPASS_NOBOTS: WriteFlags = WriteFlags(2);

    pub const fn empty() -> Self {
        WriteFlags(0)
    }

    pub const fn contains(self, other: WriteFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for WriteFlags {
    type Output = WriteFlags;
    fn bitor(self, rhs: WriteFlags) -> WriteFlags {
        WriteFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConflictBase {
    MustNotExist,
    ExpectRevision(RevisionId),
    Unconditional,
}

/// An opaque capability coupling a specific pre-read page state to a later
/// write. Records whether the read content carried an exclusion template.
#[derive(Debug, Clone)]
pub struct WriteToken {
    base: ConflictBase,
    pub needs_no_bots_bypass: bool,
}

impl WriteToken {
    pub fn for_creation() -> Self {
        WriteToken { base: ConflictBase::MustNotExist, needs_no_bots_bypass: false }
    }

    pub fn for_edit(prior_revid: RevisionId, needs_no_bots_bypass: bool) -> Self {
        WriteToken { base: ConflictBase::ExpectRevision(prior_revid), needs_no_bots_bypass }
    }

    pub fn without_conflict_detection() -> Self {
        WriteToken { base: ConflictBase::Unconditional, needs_no_bots_bypass: false }
    }
}

/// A subset of a page's revision, as read for mutation purposes.
#[derive(Debug, Clone)]
pub struct Revision {
    pub title: Title,
    pub revid: RevisionId,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

/// Evaluated synchronously before every mutating wiki request. May fail —
/// failures propagate to the caller rather than being swallowed.
#[async_trait]
pub trait EmergencyStop: Send + Sync {
    async fn is_triggered(&self) -> Result<bool, PageMutatorError>;
}

/// Never stops. Useful in tests and for callers that manage their own
/// emergency-stop policy out of band.
pub struct NeverStop;

#[async_trait]
impl EmergencyStop for NeverStop {
    async fn is_triggered(&self) -> Result<bool, PageMutatorError> {
        Ok(false)
    }
}

/// Watches the bot's own talk page. If it was edited, after this predicate's
/// initialization point, by a user with at least [`MIN_ADVANCED_EDIT_COUNT`]
/// edits, and the new content is non-empty and isn't `header_stub`, triggers.
/// Otherwise the initialization point advances past that edit, so an ignored
/// revert doesn't keep re-triggering the check.
pub struct TalkPageEmergencyStop<C: MediaWikiClient> {
    client: Arc<C>,
    bot_user_name: String,
    header_stub: String,
    initialized_at: Mutex<DateTime<Utc>>,
}

const MIN_ADVANCED_EDIT_COUNT: u64 = 50;

impl<C: MediaWikiClient> TalkPageEmergencyStop<C> {
    pub fn new(client: Arc<C>, bot_user_name: impl Into<String>, header_stub: impl Into<String>, clock: &Arc<dyn Clock>) -> Self {
        TalkPageEmergencyStop {
            client,
            bot_user_name: bot_user_name.into(),
            header_stub: header_stub.into(),
            initialized_at: Mutex::new(clock.now() - chrono::Duration::minutes(6)),
        }
    }

    fn talk_page_title(&self) -> Title {
        Title::new(wikibots_domain::types::Namespace::USER_TALK, self.bot_user_name.clone())
    }
}

#[async_trait]
impl<C: MediaWikiClient> EmergencyStop for TalkPageEmergencyStop<C> {
    async fn is_triggered(&self) -> Result<bool, PageMutatorError> {
        let title = self.talk_page_title();
        let page = match self.client.get_page(&title).await {
            Ok(page) => page,
            Err(MwApiError::ApiError { code, .. }) if code == "missingtitle" => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let initialized_at = *self.initialized_at.lock().unwrap();
        if page.timestamp <= initialized_at {
            return Ok(false);
        }

        let edit_count = self.client.get_user_edit_count(&self.bot_user_name).await?;
        let advanced_user = edit_count >= MIN_ADVANCED_EDIT_COUNT;
        let has_message = !page.wikitext.is_empty() && page.wikitext != self.header_stub;

        if advanced_user && has_message {
            Ok(true)
        } else {
            *self.initialized_at.lock().unwrap() = page.timestamp;
            Ok(false)
        }
    }
}

/// Read-modify-write orchestrator over a [`MediaWikiClient`].
pub struct PageMutator<C: MediaWikiClient> {
    client: Arc<C>,
    bot_name: String,
    message_type: String,
    emergency_stop: Arc<dyn EmergencyStop>,
    max_edit_retries: u32,
}

impl<C: MediaWikiClient> PageMutator<C> {
    pub fn new(
        client: Arc<C>,
        bot_name: impl Into<String>,
        message_type: impl Into<String>,
        emergency_stop: Arc<dyn EmergencyStop>,
    ) -> Self {
        PageMutator {
            client,
            bot_name: bot_name.into(),
            message_type: message_type.into(),
            emergency_stop,
            max_edit_retries: 3,
        }
    }

    /// Reads `title`, raising [`PageMutatorError::PageNotFound`] if absent.
    pub async fn read(&self, title: &Title) -> Result<Revision, PageMutatorError> {
        let page = self.client.get_page(title).await.map_err(|e| match e {
            MwApiError::ApiError { code, .. } if code == "missingtitle" => {
                PageMutatorError::PageNotFound { title: title.display.clone() }
            }
            other => other.into(),
        })?;
        Ok(Revision { title: page.title, revid: page.revision, timestamp: page.timestamp, content: page.wikitext })
    }

    /// Reads `title` and computes a [`WriteToken`] tying a later write to this
    /// revision. `needs_no_bots_bypass` is set if the content excludes this
    /// bot via `{{nobots}}`/`{{bots|...}}`.
    pub async fn read_with_token(&self, title: &Title) -> Result<(Revision, WriteToken), PageMutatorError> {
        let revision = self.read(title).await?;
        let needs_bypass = test_bot_exclusion(&revision.content, &self.bot_name, &self.message_type);
        let token = WriteToken::for_edit(revision.revid, needs_bypass);
        Ok((revision, token))
    }

    /// Like [`Self::read_with_token`], but returns an empty string plus a
    /// `for_creation` token instead of raising when the page is absent.
    pub async fn read_content_if_exists(&self, title: &Title) -> Result<(String, WriteToken), PageMutatorError> {
        match self.read_with_token(title).await {
            Ok((revision, token)) => Ok((revision.content, token)),
            Err(PageMutatorError::PageNotFound { .. }) => Ok((String::new(), WriteToken::for_creation())),
            Err(other) => Err(other),
        }
    }

    /// Writes `content` to `title`, honoring the token's conflict base and
    /// `needs_no_bots_bypass`, subject to the emergency-stop hook and
    /// blanking protection.
    pub async fn write(
        &self,
        title: &Title,
        content: &str,
        token: &WriteToken,
        summary: &str,
        flags: WriteFlags,
    ) -> Result<(), PageMutatorError> {
        if self.emergency_stop.is_triggered().await? {
            return Err(PageMutatorError::EmergencyStopError);
        }
        if content.is_empty() && !flags.contains(WriteFlags::ALLOW_BLANKING) {
            return Err(PageMutatorError::BlankingRejected { title: title.display.clone() });
        }
        if token.needs_no_bots_bypass && !flags.contains(WriteFlags::BYPASS_NOBOTS) {
            return Err(PageMutatorError::NoBotsError { title: title.display.clone() });
        }

        let (base_timestamp, start_timestamp) = match token.base {
            ConflictBase::MustNotExist => (String::new(), String::new()),
            ConflictBase::ExpectRevision(_) => {
                // The real base/start timestamp pair isn't known at this layer;
                // the server-side conflict check instead relies on the
                // edit-conflict error the API returns for a stale edit.
                (String::new(), String::new())
            }
            ConflictBase::Unconditional => (String::new(), String::new()),
        };

        let request = EditRequest {
            title: title.clone(),
            text: content.to_string(),
            summary: summary.to_string(),
            minor: false,
            bot: true,
            base_timestamp,
            start_timestamp,
            section: None,
        };

        self.client.edit_page(&request).await.map(|_| ()).map_err(|e| match e {
            MwApiError::EditConflict { .. } => PageMutatorError::EditConflictError { title: title.display.clone() },
            MwApiError::PageAlreadyExists { .. } => {
                PageMutatorError::PageAlreadyExistsError { title: title.display.clone() }
            }
            other => other.into(),
        })
    }

    /// Read-transform-write loop. `transform` may mutate both the content and
    /// the summary and may run more than once on conflict, so it must be a
    /// pure function of its input content. A no-op transform (unchanged
    /// content, empty summary) is a successful no-op write.
    pub async fn edit(
        &self,
        title: &Title,
        mut transform: impl FnMut(&mut String, &mut String),
        flags: WriteFlags,
    ) -> Result<(), PageMutatorError> {
        let (mut content, mut token) = self.read_content_if_exists(title).await?;

        for attempt in 0..=self.max_edit_retries {
            let original = content.clone();
            let mut summary = String::new();
            transform(&mut content, &mut summary);

            if summary.is_empty() && content == original {
                return Ok(());
            }

            match self.write(title, &content, &token, &summary, flags).await {
                Ok(()) => return Ok(()),
                Err(PageMutatorError::EditConflictError { .. }) if attempt < self.max_edit_retries => {
                    let (fresh_content, fresh_token) = self.read_content_if_exists(title).await?;
                    content = fresh_content;
                    token = fresh_token;
                }
                Err(e) => return Err(e),
            }
        }
        Err(PageMutatorError::EditConflictError { title: title.display.clone() })
    }
}
