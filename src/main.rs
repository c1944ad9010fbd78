// Replays newline-delimited JSON chat messages through the keyword engine

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use chatlight::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting chatlight v{}", chatlight::VERSION);

    let config_dir = env::var("CHATLIGHT_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let store = Arc::new(FileRuleStore::new(&config_dir));

    if let Err(e) = store.initialize().await {
        error!("Failed to initialize rule store in {}: {}", config_dir, e);
        return Err(e.into());
    }

    let user = env::var("CHATLIGHT_USER").ok().map(|name| UserIdentity {
        id: env::var("CHATLIGHT_USER_ID").unwrap_or_default(),
        name,
    });
    let channel = env::var("CHATLIGHT_CHANNEL").ok().map(|name| ChannelIdentity {
        id: env::var("CHATLIGHT_CHANNEL_ID").unwrap_or_default(),
        name,
    });
    let replay = env::var("CHATLIGHT_REPLAY").map(|v| v == "1" || v == "true").unwrap_or(false);

    let session = Arc::new(StaticSession::new(user, channel));
    let engine = KeywordEngine::new(store, session);
    engine.load_chat().await.context("loading rules")?;
    let watcher = engine.watch_changes();

    info!("Reading chat messages from stdin (replay mode: {})", replay);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut actions = LogActions;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let message: ChatMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping malformed message: {}", e);
                continue;
            }
        };

        let verdict = if replay {
            engine.handle_replay(&message, &mut actions).await
        } else {
            engine.handle(&message, &mut actions).await
        };

        let output = match verdict {
            Some(verdict) => serde_json::to_string(&verdict)?,
            None => "null".to_string(),
        };
        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    watcher.abort();
    info!("Input closed, shutting down");
    Ok(())
}
