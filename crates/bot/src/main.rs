//! Bot entry point.
//!
//! Speaks newline-delimited JSON on stdio: game events in on stdin,
//! outbound actions out on stdout. Everything human-readable goes to the
//! structured log on stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tempo_bot::config::BotConfig;
use tempo_bot::events::GameEvent;
use tempo_bot::presenter::LogPresenter;
use tempo_bot::session::GameSession;
use uci_client::{Limit, SearchBackend, UciEngine};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BotConfig::from_env();

    if std::env::args().any(|arg| arg == "--check-engine") {
        return check_engine(&config).await;
    }

    info!(
        username = %config.username,
        engine = %config.engine_path,
        "starting game session"
    );

    let engine = UciEngine::spawn(&config.engine_path)
        .await
        .with_context(|| format!("could not start engine at {}", config.engine_path))?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (action_tx, mut action_rx) = mpsc::unbounded_channel();

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<GameEvent>(line) {
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "dropping unparseable event line"),
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    error!(error = %err, "reading stdin failed");
                    break;
                }
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(action) = action_rx.recv().await {
            match serde_json::to_string(&action) {
                Ok(mut line) => {
                    line.push('\n');
                    if stdout.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                Err(err) => error!(error = %err, "could not serialize action"),
            }
        }
    });

    let session = GameSession::new(
        config,
        Box::new(engine),
        event_rx,
        action_tx,
        Arc::new(LogPresenter),
    );
    let outcome = session.run().await;

    reader.abort();
    let _ = writer.await;

    outcome.context("game session failed")
}

/// Spawn the configured engine, run one short search from the initial
/// position and shut it down again.
async fn check_engine(config: &BotConfig) -> Result<()> {
    let mut engine = UciEngine::spawn(&config.engine_path)
        .await
        .with_context(|| format!("could not start engine at {}", config.engine_path))?;
    info!(name = engine.name(), "engine handshake ok");

    let startpos = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    let limit = Limit::movetime(Duration::from_millis(100));
    let result = engine
        .play(startpos, &limit)
        .await
        .context("test search failed")?;
    info!(
        best_move = %result.best_move,
        depth = ?result.info.depth,
        "test search ok"
    );

    engine.quit().await;
    Ok(())
}
