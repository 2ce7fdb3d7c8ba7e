use crate::types::Namespace;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub api_url: url::Url,
    pub auth_method: AuthMethod,
    pub default_namespaces: HashSet<Namespace>,
    pub throttle_policy: ThrottlePolicy,
}

#[derive(Clone, Serialize, Deserialize)]
pub enum AuthMethod {
    BotPassword {
        username: String,
    },
    OAuth1 {
        consumer_key: String,
        consumer_secret: String,
        access_token: String,
        access_secret: String,
    },
    OAuth2 {
        client_id: String,
        client_secret: String,
    },
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::BotPassword { username } => f
                .debug_struct("BotPassword")
                .field("username", username)
                .finish(),
            AuthMethod::OAuth1 {
                consumer_key,
                consumer_secret: _,
                access_token,
                access_secret: _,
            } => f
                .debug_struct("OAuth1")
                .field("consumer_key", consumer_key)
                .field("consumer_secret", &"***REDACTED***")
                .field("access_token", access_token)
                .field("access_secret", &"***REDACTED***")
                .finish(),
            AuthMethod::OAuth2 {
                client_id,
                client_secret: _,
            } => f
                .debug_struct("OAuth2")
                .field("client_id", client_id)
                .field("client_secret", &"***REDACTED***")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottlePolicy {
    #[serde(with = "duration_secs")]
    pub min_edit_interval: Duration,
    pub maxlag: u32,
    pub max_retries: u32,
    #[serde(with = "duration_secs")]
    pub backoff_base: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            min_edit_interval: Duration::from_secs(12),
            maxlag: 5,
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
