use std::str::FromStr;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

/// Rows shown in the preview when nothing else is configured.
pub const DEFAULT_ROW_LIMIT: u32 = 10;

/// Address the web surface binds to by default.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Largest upload accepted by the web surface (50 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// When a transform is dispatched after the configuration changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReprocessPolicy {
    /// Configuration edits only invalidate; the user triggers every transform.
    #[default]
    Explicit,
    /// Every configuration edit re-dispatches a transform.
    Automatic,
}

impl FromStr for ReprocessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(ReprocessPolicy::Explicit),
            "automatic" | "auto" => Ok(ReprocessPolicy::Automatic),
            other => Err(format!("unknown reprocess policy: {}", other)),
        }
    }
}

/// Process-level settings for a session and the surfaces that host it.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum number of data rows in a preview.
    pub row_limit: u32,
    /// Reprocessing policy for configuration edits.
    pub policy: ReprocessPolicy,
    /// Upper bound for a single engine call; `None` waits forever.
    pub engine_timeout: Option<Duration>,
    /// Socket address for the web surface.
    pub bind_addr: String,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            row_limit: DEFAULT_ROW_LIMIT,
            policy: ReprocessPolicy::default(),
            engine_timeout: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Settings {
    /// Read settings from `PRETTYSHEET_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Values that fail to parse
    /// keep their default and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(limit) = parse_var::<u32, _>(&lookup, "PRETTYSHEET_ROW_LIMIT") {
            settings.row_limit = limit;
        }
        if let Some(policy) = parse_var::<ReprocessPolicy, _>(&lookup, "PRETTYSHEET_POLICY") {
            settings.policy = policy;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "PRETTYSHEET_ENGINE_TIMEOUT_MS") {
            settings.engine_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(addr) = lookup("PRETTYSHEET_ADDR") {
            settings.bind_addr = addr;
        }
        if let Some(bytes) = parse_var::<usize, _>(&lookup, "PRETTYSHEET_MAX_UPLOAD_BYTES") {
            settings.max_upload_bytes = bytes;
        }

        settings
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}
