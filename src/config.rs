//! Console configuration.
//!
//! Loaded from a TOML file; every section and key has a default so an empty or
//! missing file yields a usable offline configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fields::BoardKind;
use crate::store::{HttpStoreConfig, TableId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tables: TablesConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the hosted table service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API token; usually supplied through the environment instead
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout(),
            page_size: default_page_size(),
        }
    }
}

impl StoreConfig {
    pub fn http(&self) -> HttpStoreConfig {
        HttpStoreConfig {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            timeout_secs: self.timeout_secs,
            page_size: self.page_size,
        }
    }
}

/// Table ids of the console's collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    #[serde(default = "default_projects")]
    pub projects: TableId,
    #[serde(default = "default_assignments")]
    pub assignments: TableId,
    #[serde(default = "default_tasks")]
    pub tasks: TableId,
    #[serde(default = "default_subtasks")]
    pub subtasks: TableId,
    #[serde(default = "default_prospects")]
    pub prospects: TableId,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            projects: default_projects(),
            assignments: default_assignments(),
            tasks: default_tasks(),
            subtasks: default_subtasks(),
            prospects: default_prospects(),
        }
    }
}

impl TablesConfig {
    /// Table backing a board.
    pub fn for_board(&self, kind: BoardKind) -> TableId {
        match kind {
            BoardKind::Tasks => self.tasks,
            BoardKind::Assignments => self.assignments,
            BoardKind::Pipeline => self.prospects,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Automation endpoint; webhooks are skipped when unset
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { url: None, timeout_secs: default_timeout() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Identity recorded as submitter/approver and used for WIP limits
    #[serde(default = "default_actor")]
    pub actor: String,

    /// Soft work-in-progress limits per column label, per actor
    #[serde(default = "default_wip_limits")]
    pub wip_limits: HashMap<String, usize>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self { actor: default_actor(), wip_limits: default_wip_limits() }
    }
}

/// Retry policy for remote updates issued by the mutation coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryConfig {
    /// No retries, no waiting.
    pub fn none() -> Self {
        Self { max_attempts: 1, base_delay_ms: 0, max_delay_ms: 0 }
    }

    /// Delay before attempt `attempt + 1`, doubling from the base and capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

// Defaults
fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_page_size() -> u32 { 200 }
fn default_projects() -> TableId { 1 }
fn default_assignments() -> TableId { 2 }
fn default_tasks() -> TableId { 3 }
fn default_subtasks() -> TableId { 4 }
fn default_prospects() -> TableId { 5 }
fn default_actor() -> String {
    std::env::var("USER").unwrap_or_else(|_| "console".to_string())
}
fn default_wip_limits() -> HashMap<String, usize> {
    HashMap::from([("In Progress".to_string(), 5)])
}
fn default_max_attempts() -> u32 { 3 }
fn default_base_delay() -> u64 { 200 }
fn default_max_delay() -> u64 { 2000 }

impl Config {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = Config::parse("").unwrap();
        assert_eq!(cfg.tables.tasks, 3);
        assert_eq!(cfg.retry, RetryConfig::default());
        assert_eq!(cfg.board.wip_limits.get("In Progress"), Some(&5));
        assert!(cfg.webhook.url.is_none());
    }

    #[test]
    fn sections_override_selectively() {
        let cfg = Config::parse(
            r#"
            [store]
            base_url = "https://tables.example.com"

            [tables]
            tasks = 612

            [board]
            actor = "mia"
            wip_limits = { "In Progress" = 2, "Ready for Review" = 4 }

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.store.base_url, "https://tables.example.com");
        assert_eq!(cfg.store.timeout_secs, 30);
        assert_eq!(cfg.tables.for_board(BoardKind::Tasks), 612);
        assert_eq!(cfg.tables.for_board(BoardKind::Pipeline), 5);
        assert_eq!(cfg.board.actor, "mia");
        assert_eq!(cfg.board.wip_limits.len(), 2);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay_ms, 200);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let r = RetryConfig { max_attempts: 6, base_delay_ms: 200, max_delay_ms: 1000 };
        assert_eq!(r.delay_after(1), Duration::from_millis(200));
        assert_eq!(r.delay_after(2), Duration::from_millis(400));
        assert_eq!(r.delay_after(3), Duration::from_millis(800));
        assert_eq!(r.delay_after(4), Duration::from_millis(1000));
    }
}
