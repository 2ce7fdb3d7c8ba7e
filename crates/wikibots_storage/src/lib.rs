pub mod changelog;
pub mod config_store;
pub mod error;
pub mod jobqueue;
pub mod state_store;

pub use changelog::{
    ChangeLog, ChangeLogOptions, ChangeSource, ChangelogError,
    EnumerateControl as ChangeLogEnumerateControl, SourceError,
};
pub use config_store::{Preferences, TomlConfigStore};
pub use error::StorageError;
pub use jobqueue::{
    EnumerateControl as JobQueueEnumerateControl, InsertMode, Job, JobQueue, JobQueueError,
    RescheduleEntry,
};
pub use state_store::{BotState, JsonStateStore, StateStore};
