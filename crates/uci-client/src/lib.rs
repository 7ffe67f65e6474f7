//! Async UCI client for driving an external search process.
//!
//! Owns one engine process per instance: spawn + handshake, option
//! configuration, clock-aware searches, open-ended background analysis and
//! bounded teardown. Searching and background analysis are mutually
//! exclusive on a handle; starting one always settles the other first.

mod engine;
mod error;
mod info;

pub use engine::UciEngine;
pub use error::UciError;
pub use info::{Limit, PlayResult, Score, SearchInfo};

use async_trait::async_trait;

/// The search-engine protocol surface the rest of the bot programs against.
///
/// `UciEngine` is the production implementation; tests substitute a mock.
#[async_trait]
pub trait SearchBackend: Send {
    /// Engine name reported during the handshake.
    fn name(&self) -> &str;

    /// Whether the engine advertised this option during the handshake.
    fn has_option(&self, name: &str) -> bool;

    async fn set_option(&mut self, name: &str, value: &str) -> Result<(), UciError>;

    /// Search the given position and return the engine's chosen move.
    async fn play(&mut self, fen: &str, limit: &Limit) -> Result<PlayResult, UciError>;

    /// Bounded single-PV analysis of the given position.
    async fn analyse(&mut self, fen: &str, limit: &Limit) -> Result<SearchInfo, UciError>;

    /// Begin an open-ended background analysis of the given position.
    async fn start_analysis(&mut self, fen: &str) -> Result<(), UciError>;

    /// Stop a background analysis, waiting briefly for the engine to settle.
    async fn stop_analysis(&mut self) -> Result<(), UciError>;

    /// Interrupt whatever the engine is doing and leave it idle.
    ///
    /// Used when an in-flight computation is cancelled from outside; the
    /// engine must be signalled to stop before the task is abandoned.
    async fn halt(&mut self) -> Result<(), UciError>;

    /// Request graceful termination, forcing teardown after a bounded wait.
    async fn quit(&mut self);
}
