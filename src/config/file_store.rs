// src/config/file_store.rs - YAML backed rule store with hot-reload

use async_trait::async_trait;
use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Duration;

use super::{ConfigChangeEvent, ConfigError, EngineSettings, RuleStore};
use crate::types::{RuleCategory, RuleMap};

const SETTINGS_FILE: &str = "settings.yaml";

/// Rapid successive writes to one file are collapsed into a single reload
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Rule store keeping each category in `<dir>/<category>.yaml` and the
/// notification settings in `<dir>/settings.yaml`.
///
/// Edits made to the files by hand are picked up by a file watcher and
/// broadcast like writes made through [`RuleStore::set`].
#[derive(Clone)]
pub struct FileRuleStore {
    config_dir: PathBuf,
    settings: Arc<RwLock<EngineSettings>>,
    watchers: Arc<RwLock<Vec<RecommendedWatcher>>>,
    change_notifier: broadcast::Sender<ConfigChangeEvent>,
}

impl FileRuleStore {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        let (tx, _) = broadcast::channel(100);

        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            settings: Arc::new(RwLock::new(EngineSettings::default())),
            watchers: Arc::new(RwLock::new(Vec::new())),
            change_notifier: tx,
        }
    }

    /// Create the directory, load settings (writing defaults when missing)
    /// and start watching for edits
    pub async fn initialize(&self) -> Result<(), ConfigError> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir)
                .await
                .map_err(|source| ConfigError::Io { path: self.config_dir.clone(), source })?;
            info!("Created configuration directory: {}", self.config_dir.display());
        }

        let settings_path = self.config_dir.join(SETTINGS_FILE);
        if settings_path.exists() {
            *self.settings.write().await = read_yaml(&settings_path).await?;
            debug!("Loaded settings from {}", settings_path.display());
        } else {
            self.save_settings(EngineSettings::default()).await?;
        }

        self.setup_file_watcher().await?;

        info!("Rule store initialized at {}", self.config_dir.display());
        Ok(())
    }

    pub fn rules_path(&self, category: RuleCategory) -> PathBuf {
        self.config_dir.join(format!("{}.yaml", category.setting_key()))
    }

    pub async fn save_settings(&self, settings: EngineSettings) -> Result<(), ConfigError> {
        let path = self.config_dir.join(SETTINGS_FILE);
        write_yaml(&path, &settings).await?;
        *self.settings.write().await = settings;
        let _ = self.change_notifier.send(ConfigChangeEvent::SettingsUpdated);
        info!("Saved settings to {}", path.display());
        Ok(())
    }

    async fn setup_file_watcher(&self) -> Result<(), ConfigError> {
        let config_dir = self.config_dir.clone();
        let change_notifier = self.change_notifier.clone();
        let settings = self.settings.clone();

        let (tx, mut rx) = tokio::sync::mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if let Err(e) = tx.blocking_send(event) {
                        error!("Failed to forward file watch event: {}", e);
                    }
                }
                Err(e) => error!("File watcher error: {}", e),
            }
        })?;

        watcher.watch(&config_dir, RecursiveMode::NonRecursive)?;

        // dropping the watcher would stop it
        self.watchers.write().await.push(watcher);

        tokio::spawn(async move {
            let mut last_reload: HashMap<PathBuf, Instant> = HashMap::new();

            while let Some(event) = rx.recv().await {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }

                for path in event.paths {
                    let now = Instant::now();
                    if let Some(last) = last_reload.get(&path) {
                        if now.duration_since(*last) < DEBOUNCE {
                            continue;
                        }
                    }
                    last_reload.insert(path.clone(), now);

                    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };

                    let result = if filename == SETTINGS_FILE {
                        Self::reload_settings(&path, &settings).await
                    } else if let Some(category) = category_for_file(filename) {
                        Self::validate_rules(&path)
                            .await
                            .map(|_| ConfigChangeEvent::RulesUpdated { category })
                    } else {
                        debug!("Ignoring change to non-config file: {}", filename);
                        continue;
                    };

                    let event = match result {
                        Ok(event) => {
                            info!("{} changed, reloading", filename);
                            event
                        }
                        Err(e) => {
                            error!("Failed to reload {}: {}", filename, e);
                            ConfigChangeEvent::ValidationError {
                                file: filename.to_string(),
                                error: e.to_string(),
                            }
                        }
                    };
                    let _ = change_notifier.send(event);
                }
            }
        });

        info!("File watcher set up for {}", self.config_dir.display());
        Ok(())
    }

    async fn reload_settings(
        path: &Path,
        settings: &Arc<RwLock<EngineSettings>>,
    ) -> Result<ConfigChangeEvent, ConfigError> {
        let loaded: EngineSettings = read_yaml(path).await?;
        *settings.write().await = loaded;
        Ok(ConfigChangeEvent::SettingsUpdated)
    }

    /// A rules file that no longer parses keeps the previous snapshot active
    async fn validate_rules(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            let _: RuleMap = read_yaml(path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn get(&self, category: RuleCategory) -> Result<Option<RuleMap>, ConfigError> {
        let path = self.rules_path(category);
        if !path.exists() {
            return Ok(None);
        }

        let rules: Option<RuleMap> = read_yaml(&path).await?;
        // an empty file still counts as configured
        Ok(Some(rules.unwrap_or_default()))
    }

    async fn set(&self, category: RuleCategory, rules: RuleMap) -> Result<(), ConfigError> {
        let path = self.rules_path(category);
        write_yaml(&path, &rules).await?;
        debug!("Wrote {} rules to {}", rules.len(), path.display());

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

fn category_for_file(filename: &str) -> Option<RuleCategory> {
    let stem = filename
        .strip_suffix(".yaml")
        .or_else(|| filename.strip_suffix(".yml"))?;

    RuleCategory::ALL
        .into_iter()
        .find(|category| category.setting_key() == stem)
}

async fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

    serde_yaml::from_str(&content).map_err(|source| {
        warn!("Rejecting malformed {}", path.display());
        ConfigError::Yaml { path: path.to_path_buf(), source }
    })
}

async fn write_yaml<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let content = serde_yaml::to_string(value)
        .map_err(|source| ConfigError::Yaml { path: path.to_path_buf(), source })?;

    fs::write(path, content)
        .await
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
}
