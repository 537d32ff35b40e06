//! REST client configuration.

use std::env;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Environment variable holding the project URL.
pub const URL_ENV: &str = "SUPABASE_URL";
/// Environment variable holding the API key.
pub const KEY_ENV: &str = "SUPABASE_KEY";

/// Connection settings for a [`RestClient`](crate::RestClient).
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// API key sent as `apikey` and bearer token.
    pub key: String,
    /// Postgres schema other than `public`.
    pub schema: Option<String>,
    /// Total request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// User-Agent header value.
    pub user_agent: String,
}

impl RestConfig {
    /// Settings for `url` authenticated with `key`.
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
            schema: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("oxide-rest/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Reads `SUPABASE_URL` and `SUPABASE_KEY` from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingConfig`] when either variable is unset
    /// or empty.
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ClientError::MissingConfig(name.to_owned()))
        };
        Ok(Self::new(read(URL_ENV)?, read(KEY_ENV)?))
    }

    /// Targets a non-default Postgres schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Sets the total request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the User-Agent header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
