//! Live game orchestration for an automated player.
//!
//! One `GameSession` owns a single game's lifecycle end to end: it consumes
//! the ordered event stream, maintains derived game state, drives the
//! adaptive move scheduler against an exclusively-owned search process, and
//! dispatches outbound protocol actions without ever leaving more than one
//! move computation in flight.

pub mod actions;
pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod presenter;
pub mod resources;
pub mod scheduler;
pub mod session;
mod watchdog;
