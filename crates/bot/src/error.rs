//! Bot error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Config(&'static str),

    #[error("engine error: {0}")]
    Engine(#[from] uci_client::UciError),

    #[error("malformed game event: {0}")]
    Event(String),

    #[error("rules violation: {0}")]
    Rules(String),

    #[error("no legal move available")]
    NoLegalMoves,

    #[error("game event stream ended unexpectedly")]
    StreamClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
