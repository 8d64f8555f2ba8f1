//! Credential handling
//!
//! Credentials come from the command line: either a static API token or an
//! email/password pair exchanged for a session token. Tokens are cached
//! per instance URL under the user config directory so repeat runs against
//! the same instance skip the login round trip. Cached tokens never appear
//! in logs.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::api::DirectusClient;

/// How a run authenticates against an instance
#[derive(Debug, Clone)]
pub enum Credentials {
    Token(String),
    Login { email: String, password: String },
}

impl Credentials {
    /// Build credentials from the CLI's optional pieces. A token wins over
    /// an email/password pair when both are given.
    pub fn from_args(
        token: Option<String>,
        email: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        if let Some(token) = token {
            return Ok(Self::Token(token));
        }
        match (email, password) {
            (Some(email), Some(password)) => Ok(Self::Login { email, password }),
            _ => bail!("Provide either --token or both --email and --password"),
        }
    }

    /// Authenticate `client` with these credentials, consulting and
    /// updating the token cache for login credentials.
    pub async fn apply(&self, client: &DirectusClient, cache: &mut TokenCache) -> Result<()> {
        match self {
            Self::Token(token) => {
                client.set_token(token.clone());
                client
                    .me()
                    .await
                    .context("Token rejected by the instance")?;
                Ok(())
            }
            Self::Login { email, password } => {
                if let Some(cached) = cache.get(client.base_url()) {
                    client.set_token(cached.to_string());
                    if client.me().await.is_ok() {
                        debug!("reusing cached session for {}", client.base_url());
                        return Ok(());
                    }
                    cache.remove(client.base_url());
                }

                client.login(email, password).await?;
                if let Some(token) = client.current_token() {
                    cache.put(client.base_url(), token);
                }
                Ok(())
            }
        }
    }
}

/// Per-URL session token cache, persisted as JSON under the user config
/// directory.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TokenCache {
    tokens: BTreeMap<String, String>,
}

impl TokenCache {
    /// Load the cache, treating a missing or unreadable file as empty
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("ignoring corrupt token cache {}: {}", path.display(), err);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist the cache. Failure is reported but never fails the run.
    pub fn save(&self) {
        let Some(path) = Self::path() else {
            return;
        };
        if let Err(err) = self.write_to(&path) {
            warn!("failed to save token cache {}: {}", path.display(), err);
        }
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.tokens.get(url).map(String::as_str)
    }

    pub fn put(&mut self, url: &str, token: String) {
        self.tokens.insert(url.to_string(), token);
    }

    pub fn remove(&mut self, url: &str) {
        self.tokens.remove(url);
    }

    fn write_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("template-cli").join("auth.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_wins_over_login() {
        let creds =
            Credentials::from_args(Some("t".into()), Some("a@b.c".into()), Some("p".into()));
        assert!(matches!(creds, Ok(Credentials::Token(_))));
    }

    #[test]
    fn test_login_requires_both_pieces() {
        assert!(Credentials::from_args(None, Some("a@b.c".into()), None).is_err());
        assert!(Credentials::from_args(None, None, Some("p".into())).is_err());
        assert!(Credentials::from_args(None, None, None).is_err());
    }

    #[test]
    fn test_cache_round_trip_in_memory() {
        let mut cache = TokenCache::default();
        cache.put("http://a", "t1".to_string());
        assert_eq!(cache.get("http://a"), Some("t1"));
        cache.remove("http://a");
        assert_eq!(cache.get("http://a"), None);
    }
}
