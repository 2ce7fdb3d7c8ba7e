pub mod credential;
pub mod redaction;

pub use credential::{
    CredentialError, CredentialPort, FileCredentialStore, InMemoryCredentialStore,
    KeyringCredentialStore,
};
pub use redaction::redact_secrets;
