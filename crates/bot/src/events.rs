//! Incoming game event model.
//!
//! The network collaborator delivers these in order, gap-free, already
//! deserialized from the wire's camelCase payloads. The event kinds form a
//! closed set; unknown terminal statuses fall into `GameStatus::Unknown`
//! and are classified as aborts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameEvent {
    GameFull(GameFull),
    GameState(GameState),
    ChatLine(ChatLine),
    OpponentGone(OpponentGone),
}

impl GameEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::GameFull(_) => "gameFull",
            GameEvent::GameState(_) => "gameState",
            GameEvent::ChatLine(_) => "chatLine",
            GameEvent::OpponentGone(_) => "opponentGone",
        }
    }
}

/// Full-state event: immutable per-game facts plus the current state.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameFull {
    pub id: String,
    #[serde(default)]
    pub rated: bool,
    pub variant: Variant,
    #[serde(default)]
    pub clock: Option<ClockSpec>,
    #[serde(default)]
    pub initial_fen: Option<String>,
    pub white: PlayerInfo,
    pub black: PlayerInfo,
    pub state: GameState,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Variant {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Time control in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSpec {
    pub initial: u64,
    pub increment: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub rating: Option<u32>,
    #[serde(default)]
    pub ai_level: Option<u32>,
}

/// Incremental event: clocks, the authoritative move list, per-side draw
/// and takeback flags, and the (possibly terminal) status.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Space-separated UCI moves from the initial position.
    #[serde(default)]
    pub moves: String,
    pub wtime: u64,
    pub btime: u64,
    #[serde(default)]
    pub winc: u64,
    #[serde(default)]
    pub binc: u64,
    pub status: GameStatus,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub wdraw: bool,
    #[serde(default)]
    pub bdraw: bool,
    #[serde(default)]
    pub wtakeback: bool,
    #[serde(default)]
    pub btakeback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    Created,
    Started,
    Aborted,
    Mate,
    Resign,
    Stalemate,
    Timeout,
    Draw,
    Outoftime,
    Cheat,
    NoStart,
    UnknownFinish,
    VariantEnd,
    InsufficientMaterialClaim,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatLine {
    pub room: String,
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentGone {
    #[serde(default)]
    pub gone: bool,
    #[serde(default)]
    pub claim_win_in_seconds: Option<u64>,
}
