//! Client configuration.

use serde::Deserialize;

/// Default `User-Agent` sent by [`HttpTransport`](crate::transport::HttpTransport).
pub const DEFAULT_USER_AGENT: &str = concat!("carrier/", env!("CARGO_PKG_VERSION"));

/// Where and how to reach the backend.
///
/// Deserializable so applications can embed it in their own configuration file:
///
/// ```
/// use carrier::config::ClientConfig;
///
/// let config: ClientConfig =
///     serde_json::from_str(r#"{ "base_url": "https://api.example.com" }"#).unwrap();
/// assert_eq!(config.base_url, "https://api.example.com");
/// assert_eq!(config.user_agent, carrier::config::DEFAULT_USER_AGENT);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Absolute base URL every request path is resolved against.
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_owned()
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: default_user_agent(),
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
