//! API tokens, their rate-limit tables and token sessions.
//!
//! A [`TokenSession`] owns the [`RateLimiter`] for its token; every worker
//! started with a clone of the session contends for the same permits.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::{ConfigError, Method, RateLimit, RateLimiter, ValidationError};

/// Secret API token. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn new(secret: impl Into<String>) -> Result<Self, ValidationError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(ValidationError::EmptyToken);
        }
        Ok(Self(secret))
    }

    /// Raw secret for the transport layer.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Source of per-token quota tables.
pub trait TokenStore: Send + Sync {
    /// Quotas granted to `token`. Methods missing from the table are unmetered
    /// and therefore refused by the fetch worker.
    fn rate_limits(&self, token: &Token) -> Vec<RateLimit>;
}

/// A token together with the limiter shared by all of its workers.
#[derive(Debug, Clone)]
pub struct TokenSession {
    token: Token,
    limiter: Arc<RateLimiter>,
}

impl TokenSession {
    pub fn new(token: Token, limits: impl IntoIterator<Item = RateLimit>) -> Self {
        Self {
            token,
            limiter: Arc::new(RateLimiter::new(limits)),
        }
    }

    pub fn from_store(token: Token, store: &dyn TokenStore) -> Self {
        let limits = store.rate_limits(&token);
        Self::new(token, limits)
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// Quota table applied when a configured token lists no limits of its own.
pub fn default_rate_limits() -> Vec<RateLimit> {
    let table = [
        (Method::GetBondCoupons, 200),
        (Method::GetForecastBy, 200),
        (Method::GetAssetBy, 200),
        (Method::GetDividends, 200),
        (Method::GetCandles, 600),
        (Method::GetLastPrices, 600),
    ];

    table
        .into_iter()
        .filter_map(|(method, permits)| RateLimit::per_minute(method.as_str(), permits).ok())
        .collect()
}

#[derive(Debug, Deserialize)]
struct TokenConfig {
    tokens: Vec<TokenEntry>,
}

#[derive(Deserialize)]
struct TokenEntry {
    name: String,
    token: String,
    #[serde(default)]
    limits: Option<Vec<RateLimit>>,
}

impl Debug for TokenEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEntry")
            .field("name", &self.name)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// In-memory [`TokenStore`] loaded from JSON configuration.
///
/// ```json
/// { "tokens": [ { "name": "main", "token": "t.secret",
///     "limits": [ { "method": "InstrumentsService/GetBondCoupons", "permits_per_window": 200 } ] } ] }
/// ```
#[derive(Debug, Default)]
pub struct StaticTokenStore {
    limits: HashMap<Token, Vec<RateLimit>>,
    names: HashMap<String, Token>,
}

impl StaticTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: TokenConfig = serde_json::from_str(json)?;
        let mut store = Self::new();
        for entry in config.tokens {
            let token = Token::new(entry.token)?;
            let limits = entry.limits.unwrap_or_else(default_rate_limits);
            store.insert(entry.name, token, limits);
        }
        Ok(store)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn insert(&mut self, name: impl Into<String>, token: Token, limits: Vec<RateLimit>) {
        self.names.insert(name.into(), token.clone());
        self.limits.insert(token, limits);
    }

    pub fn token(&self, name: &str) -> Result<Token, ConfigError> {
        self.names
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownToken {
                name: name.to_owned(),
            })
    }

    /// Opens a fresh session for the named token.
    pub fn session(&self, name: &str) -> Result<TokenSession, ConfigError> {
        let token = self.token(name)?;
        Ok(TokenSession::from_store(token, self))
    }
}

impl TokenStore for StaticTokenStore {
    fn rate_limits(&self, token: &Token) -> Vec<RateLimit> {
        self.limits.get(token).cloned().unwrap_or_default()
    }
}
