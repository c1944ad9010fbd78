// src/engine/mod.rs - Keyword engine: rule snapshots, hot reload and classification

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

pub mod actions;
pub mod classifier;
pub mod compiler;
pub mod dedup;
pub mod matcher;
pub mod pins;
pub mod rule_set;
pub mod safety;

use crate::config::{ConfigChangeEvent, RuleStore};
use crate::types::{ChannelIdentity, ChatMessage, RuleCategory, UserIdentity, Verdict};
use actions::HighlightActions;
use classifier::Classifier;
use dedup::DuplicateSuppressor;
use matcher::MatchContext;
use pins::PinBoard;
use rule_set::{default_highlight_rules, migrate_rules, RuleSet};

/// Facts about the running chat session supplied by the host application
pub trait SessionContext: Send + Sync {
    fn current_user(&self) -> Option<UserIdentity>;

    fn current_channel(&self) -> Option<ChannelIdentity>;

    /// Whether the chat input tray is open; highlights are held back while it is
    fn is_composer_open(&self) -> bool {
        false
    }
}

/// A `SessionContext` whose values are set directly
#[derive(Debug, Default)]
pub struct StaticSession {
    user: std::sync::RwLock<Option<UserIdentity>>,
    channel: std::sync::RwLock<Option<ChannelIdentity>>,
    composer_open: AtomicBool,
}

impl StaticSession {
    pub fn new(user: Option<UserIdentity>, channel: Option<ChannelIdentity>) -> Self {
        Self {
            user: std::sync::RwLock::new(user),
            channel: std::sync::RwLock::new(channel),
            composer_open: AtomicBool::new(false),
        }
    }

    pub fn set_user(&self, user: Option<UserIdentity>) {
        if let Ok(mut guard) = self.user.write() {
            *guard = user;
        }
    }

    pub fn set_channel(&self, channel: Option<ChannelIdentity>) {
        if let Ok(mut guard) = self.channel.write() {
            *guard = channel;
        }
    }

    pub fn set_composer_open(&self, open: bool) {
        self.composer_open.store(open, Ordering::Relaxed);
    }
}

impl SessionContext for StaticSession {
    fn current_user(&self) -> Option<UserIdentity> {
        self.user.read().ok().and_then(|guard| guard.clone())
    }

    fn current_channel(&self) -> Option<ChannelIdentity> {
        self.channel.read().ok().and_then(|guard| guard.clone())
    }

    fn is_composer_open(&self) -> bool {
        self.composer_open.load(Ordering::Relaxed)
    }
}

/// Owns the active blacklist and highlight snapshots and classifies messages
/// against them.
///
/// Each snapshot is rebuilt off to the side and swapped in whole, so a
/// classification in progress sees either the old or the new rules. The recent
/// highlight history is locked separately and survives reloads.
#[derive(Clone)]
pub struct KeywordEngine {
    store: Arc<dyn RuleStore>,
    session: Arc<dyn SessionContext>,
    blacklist: Arc<RwLock<Arc<RuleSet>>>,
    highlight: Arc<RwLock<Arc<RuleSet>>>,
    recent: Arc<Mutex<DuplicateSuppressor>>,
    pins: Arc<Mutex<PinBoard>>,
    loaded_at: Arc<RwLock<DateTime<Utc>>>,
}

impl KeywordEngine {
    pub fn new(store: Arc<dyn RuleStore>, session: Arc<dyn SessionContext>) -> Self {
        Self {
            store,
            session,
            blacklist: Arc::new(RwLock::new(Arc::new(RuleSet::empty()))),
            highlight: Arc::new(RwLock::new(Arc::new(RuleSet::empty()))),
            recent: Arc::new(Mutex::new(DuplicateSuppressor::new())),
            pins: Arc::new(Mutex::new(PinBoard::new())),
            loaded_at: Arc::new(RwLock::new(Utc::now())),
        }
    }

    /// Prepare for a newly opened chat: repair stored rules, compile both
    /// categories and start counting messages as new from now on
    pub async fn load_chat(&self) -> Result<()> {
        self.repair_rules().await?;
        for category in RuleCategory::ALL {
            self.reload(category).await?;
        }
        *self.loaded_at.write().await = Utc::now();

        info!("Chat loaded");
        Ok(())
    }

    /// Upgrade legacy rules in storage and give first-time users a highlight
    /// on their own name
    pub async fn repair_rules(&self) -> Result<()> {
        for category in RuleCategory::ALL {
            if let Some(mut rules) = self.store.get(category).await? {
                if migrate_rules(&mut rules) {
                    self.store.set(category, rules).await?;
                }
            }
        }

        if self.store.get(RuleCategory::Highlight).await?.is_none() {
            if let Some(user) = self.session.current_user() {
                info!("Seeding highlight rules with the name of {}", user.name);
                self.store
                    .set(RuleCategory::Highlight, default_highlight_rules(&user))
                    .await?;
            }
        }

        Ok(())
    }

    /// Rebuild one category from storage and swap it in
    pub async fn reload(&self, category: RuleCategory) -> Result<()> {
        let mut rules = self.store.get(category).await?.unwrap_or_default();
        if migrate_rules(&mut rules) {
            self.store.set(category, rules.clone()).await?;
        }

        let compiled = Arc::new(RuleSet::compile(&rules));
        info!("Compiled {} {} rules", compiled.len(), category);

        *self.slot(category).write().await = compiled;
        Ok(())
    }

    /// Currently active snapshot of a category
    pub async fn snapshot(&self, category: RuleCategory) -> Arc<RuleSet> {
        self.slot(category).read().await.clone()
    }

    fn slot(&self, category: RuleCategory) -> &Arc<RwLock<Arc<RuleSet>>> {
        match category {
            RuleCategory::Blacklist => &self.blacklist,
            RuleCategory::Highlight => &self.highlight,
        }
    }

    /// Reload rules whenever the store reports a change. Runs until the
    /// returned task is aborted.
    pub fn watch_changes(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let mut changes = self.store.subscribe();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(ConfigChangeEvent::RulesUpdated { category }) => {
                        if let Err(e) = engine.reload(category).await {
                            warn!("Keeping previous {} rules, reload failed: {}", category, e);
                        }
                    }
                    Ok(ConfigChangeEvent::SettingsUpdated) => {
                        debug!("Settings updated");
                    }
                    Ok(ConfigChangeEvent::ValidationError { file, error }) => {
                        warn!("Ignoring invalid configuration in {}: {}", file, error);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} configuration events, reloading everything", skipped);
                        for category in RuleCategory::ALL {
                            if let Err(e) = engine.reload(category).await {
                                warn!("Keeping previous {} rules, reload failed: {}", category, e);
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Classify a live chat message. `None` when the message has no sender.
    pub async fn classify(&self, message: &ChatMessage) -> Option<Verdict> {
        let blacklist = self.snapshot(RuleCategory::Blacklist).await;
        let highlight = self.snapshot(RuleCategory::Highlight).await;
        let loaded_at = *self.loaded_at.read().await;

        let user = self.session.current_user();
        let channel = self.session.current_channel();
        let ctx = MatchContext::new(
            user.as_ref().map(|u| u.name.as_str()),
            channel.as_ref().map(|c| c.name.as_str()),
        );

        let classifier = Classifier::new(&blacklist, &highlight, ctx, loaded_at);
        let mut recent = self.recent.lock().await;
        classifier.classify(message, self.session.is_composer_open(), &mut recent)
    }

    /// Classify a message from a recorded video's chat replay
    pub async fn classify_replay(&self, message: &ChatMessage) -> Option<Verdict> {
        let blacklist = self.snapshot(RuleCategory::Blacklist).await;
        let highlight = self.snapshot(RuleCategory::Highlight).await;
        let loaded_at = *self.loaded_at.read().await;

        let user = self.session.current_user();
        let channel = self.session.current_channel();
        let ctx = MatchContext::new(
            user.as_ref().map(|u| u.name.as_str()),
            channel.as_ref().map(|c| c.name.as_str()),
        );

        let classifier = Classifier::new(&blacklist, &highlight, ctx, loaded_at);
        let mut recent = self.recent.lock().await;
        classifier.classify_replay(message, &mut recent, Utc::now())
    }

    /// Classify a live message and carry out the verdict, keeping the pinned
    /// highlight board in step with what was pinned
    pub async fn handle<A: HighlightActions + Send + ?Sized>(
        &self,
        message: &ChatMessage,
        actions: &mut A,
    ) -> Option<Verdict> {
        let verdict = self.classify(message).await?;
        self.apply(&verdict, message, actions).await;
        Some(verdict)
    }

    /// Same as [`handle`](Self::handle) for chat replay messages
    pub async fn handle_replay<A: HighlightActions + Send + ?Sized>(
        &self,
        message: &ChatMessage,
        actions: &mut A,
    ) -> Option<Verdict> {
        let verdict = self.classify_replay(message).await?;
        self.apply(&verdict, message, actions).await;
        Some(verdict)
    }

    async fn apply<A: HighlightActions + Send + ?Sized>(
        &self,
        verdict: &Verdict,
        message: &ChatMessage,
        actions: &mut A,
    ) {
        let settings = self.store.settings().await;
        verdict.dispatch(message, &settings, actions);

        if let Verdict::Highlight { pin: Some(request), .. } = verdict {
            let now = Utc::now();
            let mut pins = self.pins.lock().await;
            pins.expire(&settings, now);
            pins.pin(request, &settings, now);
        }
    }

    /// Drop pinned highlights that timed out; returns how many were removed
    pub async fn expire_pins(&self) -> usize {
        let settings = self.store.settings().await;
        self.pins.lock().await.expire(&settings, Utc::now())
    }

    pub fn pin_board(&self) -> Arc<Mutex<PinBoard>> {
        self.pins.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineSettings, MemoryRuleStore};
    use crate::types::{rule_map, PinRequest, RuleDefinition, RuleMap, RuleType};
    use chrono::Duration;
    use tokio::time::{sleep, Duration as TokioDuration};

    fn user(name: &str) -> UserIdentity {
        UserIdentity { id: "1".to_string(), name: name.to_string() }
    }

    fn channel(name: &str) -> ChannelIdentity {
        ChannelIdentity { id: "2".to_string(), name: name.to_string() }
    }

    fn build(store: MemoryRuleStore, session: StaticSession) -> (KeywordEngine, Arc<MemoryRuleStore>, Arc<StaticSession>) {
        let store = Arc::new(store);
        let session = Arc::new(session);
        let engine = KeywordEngine::new(store.clone(), session.clone());
        (engine, store, session)
    }

    fn fresh(sender: &str, text: &str) -> ChatMessage {
        ChatMessage::new(sender, text, Utc::now() + Duration::seconds(1))
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl HighlightActions for Recorder {
        fn suppress(&mut self, message: &ChatMessage) {
            self.calls.push(format!("suppress {}", message.text));
        }

        fn mark(&mut self, _message: &ChatMessage, color: &str) {
            self.calls.push(format!("mark {}", color));
        }

        fn notify(&mut self) {
            self.calls.push("notify".to_string());
        }

        fn pin(&mut self, request: &PinRequest) {
            self.calls.push(format!("pin {}", request.text));
        }
    }

    #[tokio::test]
    async fn test_end_to_end_mark_notify_pin() {
        let store = MemoryRuleStore::new().with_rules(
            RuleCategory::Highlight,
            rule_map(vec![RuleDefinition::new(0, RuleType::Message, "hello")]),
        );
        let (engine, _, _) = build(store, StaticSession::default());
        engine.load_chat().await.unwrap();

        let message = fresh("x", "hello world");
        let mut recorder = Recorder::default();
        let verdict = engine.handle(&message, &mut recorder).await.unwrap();

        assert!(verdict.is_highlighted());
        assert_eq!(recorder.calls, vec!["mark #ff0000", "notify", "pin hello world"]);
        assert_eq!(engine.pin_board().lock().await.len(), 1);

        // the same message again is marked without a second notification
        let mut recorder = Recorder::default();
        engine.handle(&message, &mut recorder).await.unwrap();
        assert_eq!(recorder.calls, vec!["mark #ff0000"]);
    }

    #[tokio::test]
    async fn test_replay_uses_session_channel() {
        let store = MemoryRuleStore::new().with_rules(
            RuleCategory::Blacklist,
            rule_map(vec![RuleDefinition::new(0, RuleType::Message, "spoiler").with_channels(["alice"])]),
        );
        let (engine, _, session) = build(store, StaticSession::new(None, Some(channel("bob"))));
        engine.load_chat().await.unwrap();

        let message = fresh("viewer", "spoiler alert");
        assert_eq!(engine.classify(&message).await, Some(Verdict::Pass));
        assert_eq!(engine.classify_replay(&message).await, Some(Verdict::Pass));

        session.set_channel(Some(channel("alice")));
        assert_eq!(engine.classify_replay(&message).await, Some(Verdict::Suppress));
    }

    #[tokio::test]
    async fn test_seeds_highlight_for_new_user() {
        let (engine, store, _) = build(
            MemoryRuleStore::new(),
            StaticSession::new(Some(user("streamer")), None),
        );
        engine.load_chat().await.unwrap();

        let seeded = store.get(RuleCategory::Highlight).await.unwrap().unwrap();
        assert_eq!(seeded["0"].keyword, "streamer");
        assert_eq!(seeded["0"].rule_type, RuleType::Message);

        let verdict = engine.classify(&fresh("viewer", "hi @streamer")).await.unwrap();
        assert!(verdict.is_highlighted());

        // the user's own message does not trigger their name rule
        let verdict = engine.classify(&fresh("streamer", "streamer here")).await.unwrap();
        assert_eq!(verdict, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_no_seed_without_user_or_when_configured() {
        let (engine, store, _) = build(MemoryRuleStore::new(), StaticSession::default());
        engine.load_chat().await.unwrap();
        assert!(store.get(RuleCategory::Highlight).await.unwrap().is_none());

        let configured = MemoryRuleStore::new().with_rules(RuleCategory::Highlight, RuleMap::new());
        let (engine, store, _) = build(configured, StaticSession::new(Some(user("streamer")), None));
        engine.load_chat().await.unwrap();
        assert_eq!(store.get(RuleCategory::Highlight).await.unwrap().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_load_repairs_legacy_rules() {
        let store = MemoryRuleStore::new().with_rules(
            RuleCategory::Blacklist,
            rule_map(vec![
                RuleDefinition::new(0, RuleType::Exact, "abc"),
                RuleDefinition::new(1, RuleType::Message, "  "),
            ]),
        );
        let (engine, store, _) = build(store, StaticSession::default());
        engine.load_chat().await.unwrap();

        let repaired = store.get(RuleCategory::Blacklist).await.unwrap().unwrap();
        assert_eq!(repaired.len(), 1);
        assert_eq!(repaired["0"].rule_type, RuleType::Message);
        assert_eq!(repaired["0"].keyword, "<abc>");

        assert!(engine.classify(&fresh("x", "abc")).await.unwrap().is_suppressed());
        assert_eq!(engine.classify(&fresh("x", "abc def")).await, Some(Verdict::Pass));
    }

    #[tokio::test]
    async fn test_channel_scope_follows_session() {
        let store = MemoryRuleStore::new().with_rules(
            RuleCategory::Blacklist,
            rule_map(vec![RuleDefinition::new(0, RuleType::Message, "spoiler").with_channels(["alice"])]),
        );
        let (engine, _, session) = build(store, StaticSession::new(None, Some(channel("bob"))));
        engine.load_chat().await.unwrap();

        assert_eq!(engine.classify(&fresh("x", "spoiler")).await, Some(Verdict::Pass));

        session.set_channel(Some(channel("alice")));
        assert!(engine.classify(&fresh("x", "spoiler")).await.unwrap().is_suppressed());

        session.set_channel(None);
        assert!(engine.classify(&fresh("x", "spoiler")).await.unwrap().is_suppressed());
    }

    #[tokio::test]
    async fn test_composer_gate() {
        let store = MemoryRuleStore::new().with_rules(
            RuleCategory::Highlight,
            rule_map(vec![RuleDefinition::new(0, RuleType::Message, "hello")]),
        );
        let (engine, _, session) = build(store, StaticSession::default());
        engine.load_chat().await.unwrap();

        session.set_composer_open(true);
        assert_eq!(engine.classify(&fresh("x", "hello")).await, Some(Verdict::Pass));

        session.set_composer_open(false);
        assert!(engine.classify(&fresh("x", "hello")).await.unwrap().is_highlighted());
    }

    #[tokio::test]
    async fn test_snapshot_swap_keeps_old_snapshot_intact() {
        let store = MemoryRuleStore::new().with_rules(
            RuleCategory::Highlight,
            rule_map(vec![RuleDefinition::new(0, RuleType::Message, "old")]),
        );
        let (engine, store, _) = build(store, StaticSession::default());
        engine.load_chat().await.unwrap();

        let before = engine.snapshot(RuleCategory::Highlight).await;
        store
            .set(
                RuleCategory::Highlight,
                rule_map(vec![
                    RuleDefinition::new(0, RuleType::Message, "new"),
                    RuleDefinition::new(1, RuleType::User, "friend"),
                ]),
            )
            .await
            .unwrap();
        engine.reload(RuleCategory::Highlight).await.unwrap();

        let after = engine.snapshot(RuleCategory::Highlight).await;
        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn test_watch_changes_reloads() {
        let (engine, store, _) = build(MemoryRuleStore::new(), StaticSession::default());
        engine.load_chat().await.unwrap();
        let watcher = engine.watch_changes();

        store
            .set(
                RuleCategory::Blacklist,
                rule_map(vec![RuleDefinition::new(0, RuleType::Message, "spam")]),
            )
            .await
            .unwrap();

        let mut suppressed = false;
        for _ in 0..50 {
            if engine.classify(&fresh("x", "spam")).await == Some(Verdict::Suppress) {
                suppressed = true;
                break;
            }
            sleep(TokioDuration::from_millis(20)).await;
        }
        assert!(suppressed);

        watcher.abort();
    }

    #[tokio::test]
    async fn test_duplicate_history_survives_reload() {
        let store = MemoryRuleStore::new().with_rules(
            RuleCategory::Highlight,
            rule_map(vec![RuleDefinition::new(0, RuleType::Message, "hello")]),
        );
        let (engine, _, _) = build(store, StaticSession::default());
        engine.load_chat().await.unwrap();

        let message = fresh("x", "hello");
        assert!(matches!(engine.classify(&message).await, Some(Verdict::Highlight { notify: true, .. })));

        engine.reload(RuleCategory::Highlight).await.unwrap();
        assert!(matches!(engine.classify(&message).await, Some(Verdict::Highlight { notify: false, .. })));
    }

    #[tokio::test]
    async fn test_replay_pins_without_sound() {
        let store = MemoryRuleStore::new().with_rules(
            RuleCategory::Highlight,
            rule_map(vec![RuleDefinition::new(0, RuleType::Message, "clip")]),
        );
        let (engine, store, _) = build(store, StaticSession::default());
        store
            .set_settings(EngineSettings { max_pinned_highlights: 1, ..EngineSettings::default() })
            .await;
        engine.load_chat().await.unwrap();

        let mut recorder = Recorder::default();
        engine.handle_replay(&fresh("a", "clip that"), &mut recorder).await.unwrap();
        engine.handle_replay(&fresh("b", "clip this"), &mut recorder).await.unwrap();

        assert_eq!(
            recorder.calls,
            vec!["mark #ff0000", "pin clip that", "mark #ff0000", "pin clip this"]
        );

        let board = engine.pin_board();
        let board = board.lock().await;
        assert_eq!(board.len(), 1);
        assert_eq!(board.pins().next().unwrap().text, "clip this");
    }
}
