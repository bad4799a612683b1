//! Remote kill switch consulted once before any data is loaded.
//!
//! The switch fails open: only an explicit "off" answer blocks the
//! workflow. A missing, broken or unreachable flag source lets it run.

use crate::error::ServiceError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::CACHE_CONTROL;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_KILL_MESSAGE: &str = "Access blocked by the administrator.";

static PINNED_REVISION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/raw/[a-f0-9]+/").expect("revision pattern valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagState {
    Active,
    Killed { message: String },
}

impl FlagState {
    pub fn is_killed(&self) -> bool {
        matches!(self, FlagState::Killed { .. })
    }
}

#[async_trait]
pub trait FlagSource: Send + Sync {
    /// Raw flag document.
    async fn fetch(&self) -> Result<String, ServiceError>;
}

/// Flag document served over HTTP (typically a raw gist file).
pub struct HttpFlagSource {
    http: reqwest::Client,
    url: String,
}

impl HttpFlagSource {
    pub fn new(url: &str, timeout: Duration, user_agent: &str) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self::with_client(http, url))
    }

    pub fn with_client(http: reqwest::Client, url: &str) -> Self {
        Self {
            http,
            url: normalize_flag_url(url),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FlagSource for HttpFlagSource {
    async fn fetch(&self) -> Result<String, ServiceError> {
        let response = self
            .http
            .get(&self.url)
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Drop a pinned revision hash so the live file is fetched.
///
/// `.../raw/7ba954dd.../switch.json` becomes `.../raw/switch.json`.
pub fn normalize_flag_url(url: &str) -> String {
    PINNED_REVISION.replace(url.trim(), "/raw/").into_owned()
}

/// Killed on a bare `false` or an object with `"active": false`.
pub fn interpret(body: &str) -> FlagState {
    let trimmed = body.trim();
    if trimmed.eq_ignore_ascii_case("false") {
        return FlagState::Killed {
            message: DEFAULT_KILL_MESSAGE.to_string(),
        };
    }

    let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(trimmed) else {
        return FlagState::Active;
    };
    if doc.get("active") != Some(&Value::Bool(false)) {
        return FlagState::Active;
    }

    let message = doc
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(DEFAULT_KILL_MESSAGE)
        .to_string();
    FlagState::Killed { message }
}

/// Fetch and interpret the flag. Fetch failures count as active.
pub async fn check(source: &dyn FlagSource) -> FlagState {
    match source.fetch().await {
        Ok(body) => {
            let state = interpret(&body);
            if let FlagState::Killed { message } = &state {
                info!(%message, "kill switch is off; workflow blocked");
            }
            state
        }
        Err(error) => {
            warn!(%error, category = %error.category(), "kill switch unreachable; continuing");
            FlagState::Active
        }
    }
}
