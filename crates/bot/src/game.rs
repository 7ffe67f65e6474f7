//! Derived game state: immutable per-game facts, the live board and
//! clocks, and the terminal result classification.
//!
//! The board is owned here and mutated exclusively through the rules
//! engine; the session never edits the position by hand.

use std::time::Duration;

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};

use crate::error::BotError;
use crate::events::{GameFull, GameState, GameStatus, PlayerInfo};

/// Clock budget for games delivered without a clock spec.
const UNLIMITED_BASE_SEC: f64 = 86_400.0;

/// Immutable per-game facts, created once from the first full-state event.
#[derive(Debug, Clone)]
pub struct GameInfo {
    pub game_id: String,
    pub our_color: Color,
    pub white_name: String,
    pub black_name: String,
    pub white_title: Option<String>,
    pub black_title: Option<String>,
    pub white_rating: Option<u32>,
    pub black_rating: Option<u32>,
    pub initial_sec: f64,
    pub increment_sec: f64,
    pub rated: bool,
    pub variant: String,
    pub initial_fen: Option<String>,
}

impl GameInfo {
    pub fn from_game_full(full: &GameFull, username: &str) -> Self {
        let is_us = |p: &PlayerInfo| {
            p.name
                .as_deref()
                .or(p.id.as_deref())
                .is_some_and(|n| n.eq_ignore_ascii_case(username))
        };
        let our_color = if is_us(&full.white) {
            Color::White
        } else {
            Color::Black
        };

        let (initial_sec, increment_sec) = match full.clock {
            Some(clock) => (
                clock.initial as f64 / 1000.0,
                clock.increment as f64 / 1000.0,
            ),
            None => (UNLIMITED_BASE_SEC, 0.0),
        };

        Self {
            game_id: full.id.clone(),
            our_color,
            white_name: display_name(&full.white),
            black_name: display_name(&full.black),
            white_title: full.white.title.clone(),
            black_title: full.black.title.clone(),
            white_rating: full.white.rating,
            black_rating: full.black.rating,
            initial_sec,
            increment_sec,
            rated: full.rated,
            variant: full.variant.key.clone(),
            initial_fen: full.initial_fen.clone(),
        }
    }

    pub fn white_str(&self) -> String {
        player_str(&self.white_name, &self.white_title, self.white_rating)
    }

    pub fn black_str(&self) -> String {
        player_str(&self.black_name, &self.black_title, self.black_rating)
    }

    /// Time control as `minutes+increment`, e.g. `3+2` or `0.5+0`.
    pub fn tc_format(&self) -> String {
        if self.initial_sec >= UNLIMITED_BASE_SEC {
            return "unlimited".to_string();
        }
        let minutes = self.initial_sec / 60.0;
        let base = if minutes.fract() == 0.0 {
            format!("{}", minutes as u64)
        } else {
            format!("{minutes:.1}")
        };
        format!("{base}+{}", self.increment_sec as u64)
    }

    /// Both players carry the BOT title, i.e. we are playing a fellow
    /// automated peer.
    pub fn opponent_is_bot(&self) -> bool {
        self.white_title.as_deref() == Some("BOT") && self.black_title.as_deref() == Some("BOT")
    }

    pub fn is_standard(&self) -> bool {
        matches!(self.variant.as_str(), "standard" | "fromPosition")
    }
}

fn display_name(p: &PlayerInfo) -> String {
    p.name
        .clone()
        .or_else(|| p.id.clone())
        .unwrap_or_else(|| match p.ai_level {
            Some(level) => format!("AI level {level}"),
            None => "Anonymous".to_string(),
        })
}

fn player_str(name: &str, title: &Option<String>, rating: Option<u32>) -> String {
    let rating = rating.map_or_else(|| "?".to_string(), |r| r.to_string());
    match title {
        Some(title) => format!("{title} {name} ({rating})"),
        None => format!("{name} ({rating})"),
    }
}

/// Remaining time per side, overwritten on each incremental update.
#[derive(Debug, Clone, Copy)]
pub struct ClockState {
    pub white: Duration,
    pub black: Duration,
    pub increment: Duration,
}

/// Live game context: position, applied moves and clocks.
#[derive(Debug, Clone)]
pub struct GameCtx {
    pub info: GameInfo,
    pub clock: ClockState,
    initial: Chess,
    position: Chess,
    moves: Vec<Move>,
    /// Board-only FEN keys of every position reached, for repetition
    /// detection.
    fens: Vec<String>,
}

impl GameCtx {
    pub fn new(info: GameInfo) -> Result<Self, BotError> {
        let initial = match info.initial_fen.as_deref() {
            None | Some("startpos") => Chess::default(),
            Some(fen) => fen
                .parse::<Fen>()
                .map_err(|e| BotError::Rules(format!("bad initial fen: {e}")))?
                .into_position(CastlingMode::Standard)
                .map_err(|e| BotError::Rules(format!("bad initial position: {e}")))?,
        };

        let base = Duration::from_secs_f64(info.initial_sec);
        let clock = ClockState {
            white: base,
            black: base,
            increment: Duration::from_secs_f64(info.increment_sec),
        };

        let mut ctx = Self {
            info,
            clock,
            position: initial.clone(),
            initial,
            moves: Vec::new(),
            fens: Vec::new(),
        };
        ctx.fens.push(ctx.board_key());
        Ok(ctx)
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn ply_count(&self) -> usize {
        self.moves.len()
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.position, EnPassantMode::Legal).to_string()
    }

    /// Position after playing `mv` on the current board.
    pub fn fen_after(&self, mv: &Move) -> String {
        let mut pos = self.position.clone();
        pos.play_unchecked(mv.clone());
        Fen::from_position(&pos, EnPassantMode::Legal).to_string()
    }

    /// Merge clock values only, leaving the board untouched. Used when the
    /// event's move list is known to be stale (a takeback we just granted).
    pub fn update_clocks(&mut self, state: &GameState) {
        self.clock = ClockState {
            white: Duration::from_millis(state.wtime),
            black: Duration::from_millis(state.btime),
            increment: Duration::from_millis(state.winc),
        };
    }

    /// Merge clocks and the authoritative move list. Returns whether the
    /// position changed. A shortened or diverging list (takeback settled
    /// server-side) triggers a full rebuild.
    pub fn update(&mut self, state: &GameState) -> Result<bool, BotError> {
        self.update_clocks(state);

        let list: Vec<&str> = state.moves.split_whitespace().collect();
        let prefix_matches = list.len() >= self.moves.len()
            && self
                .moves
                .iter()
                .zip(list.iter())
                .all(|(m, uci)| m.to_uci(CastlingMode::Standard).to_string() == **uci);

        if !prefix_matches {
            self.rebuild(&list)?;
            return Ok(true);
        }

        let suffix: Vec<String> = list[self.moves.len()..]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut changed = false;
        for uci in &suffix {
            self.apply_uci(uci)?;
            changed = true;
        }
        Ok(changed)
    }

    /// Roll the board back one ply.
    pub fn takeback(&mut self) -> Result<(), BotError> {
        if self.moves.is_empty() {
            return Err(BotError::Rules("no move to take back".to_string()));
        }
        let keep: Vec<String> = self.moves[..self.moves.len() - 1]
            .iter()
            .map(|m| m.to_uci(CastlingMode::Standard).to_string())
            .collect();
        let refs: Vec<&str> = keep.iter().map(String::as_str).collect();
        self.rebuild(&refs)
    }

    fn rebuild(&mut self, list: &[&str]) -> Result<(), BotError> {
        self.position = self.initial.clone();
        self.moves.clear();
        self.fens.clear();
        self.fens.push(self.board_key());
        for uci in list {
            self.apply_uci(uci)?;
        }
        Ok(())
    }

    fn apply_uci(&mut self, uci: &str) -> Result<(), BotError> {
        let parsed: UciMove = uci
            .parse()
            .map_err(|_| BotError::Event(format!("unparseable move {uci}")))?;
        let mv = parsed
            .to_move(&self.position)
            .map_err(|_| BotError::Rules(format!("illegal move {uci}")))?;
        self.position.play_unchecked(mv.clone());
        self.moves.push(mv);
        self.fens.push(self.board_key());
        Ok(())
    }

    fn board_key(&self) -> String {
        let fen = Fen::from_position(&self.position, EnPassantMode::Legal).to_string();
        fen.split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_our_turn(&self) -> bool {
        self.position.turn() == self.info.our_color
    }

    /// A game is abortable until both sides have moved.
    pub fn is_abortable(&self) -> bool {
        self.moves.len() < 2
    }

    pub fn in_check(&self) -> bool {
        self.position.is_check()
    }

    /// Volatility proxy: legal captures plus legal promotions. A capturing
    /// promotion counts in both sums.
    pub fn tactical_score(&self) -> usize {
        let legal = self.position.legal_moves();
        let captures = legal.iter().filter(|m| m.is_capture()).count();
        let promotions = legal.iter().filter(|m| m.is_promotion()).count();
        captures + promotions
    }

    pub fn any_legal_move(&self) -> Option<Move> {
        self.position.legal_moves().into_iter().next()
    }

    pub fn our_clock(&self) -> Duration {
        match self.info.our_color {
            Color::White => self.clock.white,
            Color::Black => self.clock.black,
        }
    }

    pub fn is_fifty_moves(&self) -> bool {
        self.position.halfmoves() >= 100
    }

    pub fn is_repetition(&self) -> bool {
        let Some(current) = self.fens.last() else {
            return false;
        };
        self.fens.iter().filter(|f| *f == current).count() >= 3
    }

    pub fn insufficient_material(&self) -> bool {
        self.position.is_insufficient_material()
    }
}

/// Classified terminal outcome with a human-readable message.
#[derive(Debug, Clone, PartialEq)]
pub struct GameResult {
    pub message: String,
    pub white_score: &'static str,
    pub black_score: &'static str,
    pub aborted: bool,
}

/// Map a terminal event onto its outcome. Any unrecognized terminal status
/// counts as an abort, not a completed game.
pub fn classify_result(state: &GameState, ctx: &GameCtx) -> GameResult {
    let info = &ctx.info;

    if let Some(winner) = state.winner.as_deref() {
        let (mut message, loser, white_score, black_score) = if winner == "white" {
            (
                format!("{} won", info.white_name),
                info.black_name.as_str(),
                "1",
                "0",
            )
        } else {
            (
                format!("{} won", info.black_name),
                info.white_name.as_str(),
                "0",
                "1",
            )
        };

        match state.status {
            GameStatus::Mate => message.push_str(" by checkmate!"),
            GameStatus::Outoftime => message.push_str(&format!("! {loser} ran out of time.")),
            GameStatus::Resign => message.push_str(&format!("! {loser} resigned.")),
            GameStatus::VariantEnd => message.push_str(" by variant rules!"),
            GameStatus::Timeout => message.push_str(&format!("! {loser} timed out.")),
            GameStatus::NoStart => {
                message.push_str(&format!("! {loser} has not started the game."))
            }
            _ => {}
        }

        return GameResult {
            message,
            white_score,
            black_score,
            aborted: false,
        };
    }

    let draw = |message: String| GameResult {
        message,
        white_score: "1/2",
        black_score: "1/2",
        aborted: false,
    };

    match state.status {
        GameStatus::Draw => {
            let message = if ctx.is_fifty_moves() {
                "Game drawn by 50-move rule.".to_string()
            } else if ctx.is_repetition() {
                "Game drawn by threefold repetition.".to_string()
            } else if ctx.insufficient_material() {
                "Game drawn due to insufficient material.".to_string()
            } else if !info.is_standard() {
                "Game drawn by variant rules.".to_string()
            } else {
                "Game drawn by agreement.".to_string()
            };
            draw(message)
        }
        GameStatus::Stalemate => draw("Game drawn by stalemate.".to_string()),
        GameStatus::Outoftime => {
            let flagged = if state.wtime > 0 {
                &info.black_name
            } else {
                &info.white_name
            };
            draw(format!("Game drawn. {flagged} ran out of time."))
        }
        GameStatus::InsufficientMaterialClaim => {
            draw("Game drawn due to insufficient material claim.".to_string())
        }
        _ => GameResult {
            message: "Game aborted.".to_string(),
            white_score: "X",
            black_score: "X",
            aborted: true,
        },
    }
}
