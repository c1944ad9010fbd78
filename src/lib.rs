//! # chatlight
//!
//! Rule engine deciding, for every incoming chat message, whether it should be
//! hidden (blacklisted) or highlighted, based on user-configured keyword, user
//! and badge rules.
//!
//! ## Features
//!
//! - **Rule Syntax**: literal phrases, `*` wildcards, `<exact>` tokens and
//!   `~/regex/flags` expressions
//! - **Regex Screening**: nested or excessive quantifiers are rejected before
//!   compilation; bad rules quietly never match
//! - **Three Fields**: message text, sender login and badge labels, each with
//!   optional per-channel scoping
//! - **Blacklist First**: a hidden message is never highlighted
//! - **Duplicate Suppression**: repeated highlights within the same minute
//!   notify only once
//! - **Hot Reload**: rules are recompiled and swapped atomically when the
//!   configuration changes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatlight::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(FileRuleStore::new("config"));
//!     store.initialize().await?;
//!
//!     let session = Arc::new(StaticSession::default());
//!     let engine = KeywordEngine::new(store, session);
//!     engine.load_chat().await?;
//!     engine.watch_changes();
//!
//!     let message = ChatMessage::new("viewer", "hello world", chrono::Utc::now());
//!     engine.handle(&message, &mut LogActions).await;
//!
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod config;
pub mod engine;

// Re-export commonly used items
pub mod prelude {
    pub use crate::config::{
        ConfigChangeEvent, ConfigError, EngineSettings, FileRuleStore, MemoryRuleStore, RuleStore,
    };
    pub use crate::engine::{
        actions::{HighlightActions, LogActions},
        KeywordEngine, SessionContext, StaticSession,
    };
    pub use crate::types::{
        ChannelIdentity, ChatMessage, PinRequest, ReplyContext, RuleCategory, RuleDefinition,
        RuleId, RuleMap, RuleType, UserIdentity, Verdict,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
