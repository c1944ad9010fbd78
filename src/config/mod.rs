// src/config/mod.rs - Rule storage, engine settings and change notification

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::types::{RuleCategory, RuleMap};

pub mod file_store;

pub use file_store::FileRuleStore;

/// Errors raised by rule stores
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Events broadcast when stored configuration changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChangeEvent {
    RulesUpdated { category: RuleCategory },
    SettingsUpdated,
    ValidationError { file: String, error: String },
}

/// User preferences around highlight notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Play a sound for new highlights
    pub highlight_feedback: bool,
    /// Show pinned highlight cards
    pub pinned_highlights: bool,
    /// Most pinned cards shown at once
    pub max_pinned_highlights: usize,
    /// Remove pinned cards after a minute
    pub timeout_highlights: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            highlight_feedback: true,
            pinned_highlights: true,
            max_pinned_highlights: 10,
            timeout_highlights: true,
        }
    }
}

/// Where the blacklist and highlight rule mappings live.
///
/// `get` returns `None` for a category that was never configured, which is
/// different from an empty mapping.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn get(&self, category: RuleCategory) -> Result<Option<RuleMap>, ConfigError>;

    /// Replace the stored rules of a category and notify subscribers
    async fn set(&self, category: RuleCategory, rules: RuleMap) -> Result<(), ConfigError>;

    async fn settings(&self) -> EngineSettings;

    fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent>;
}

/// In-process rule store, used when rules are owned by the embedding
/// application rather than by files on disk
#[derive(Clone)]
pub struct MemoryRuleStore {
    rules: Arc<RwLock<HashMap<RuleCategory, RuleMap>>>,
    settings: Arc<RwLock<EngineSettings>>,
    change_notifier: broadcast::Sender<ConfigChangeEvent>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self {
            rules: Arc::new(RwLock::new(HashMap::new())),
            settings: Arc::new(RwLock::new(EngineSettings::default())),
            change_notifier: tx,
        }
    }

    pub fn with_rules(self, category: RuleCategory, rules: RuleMap) -> Self {
        // nothing else holds the lock yet
        if let Ok(mut guard) = self.rules.try_write() {
            guard.insert(category, rules);
        }
        self
    }

    pub async fn set_settings(&self, settings: EngineSettings) {
        *self.settings.write().await = settings;
        let _ = self.change_notifier.send(ConfigChangeEvent::SettingsUpdated);
    }
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn get(&self, category: RuleCategory) -> Result<Option<RuleMap>, ConfigError> {
        Ok(self.rules.read().await.get(&category).cloned())
    }

    async fn set(&self, category: RuleCategory, rules: RuleMap) -> Result<(), ConfigError> {
        self.rules.write().await.insert(category, rules);
        let _ = self.change_notifier.send(ConfigChangeEvent::RulesUpdated { category });
        Ok(())
    }

    async fn settings(&self) -> EngineSettings {
        self.settings.read().await.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_notifier.subscribe()
    }
}
