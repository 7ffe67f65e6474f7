//! UCI client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UciError {
    #[error("failed to spawn engine process: {0}")]
    Spawn(std::io::Error),

    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine closed its output stream")]
    Eof,

    #[error("unexpected engine reply: {0}")]
    Protocol(String),
}
