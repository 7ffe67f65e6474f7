//! Shared test fixtures: a scriptable in-process search backend and event
//! builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Position};
use uci_client::{Limit, PlayResult, Score, SearchBackend, SearchInfo, UciError};

use tempo_bot::config::{BotConfig, DrawConfig, ResignConfig, SyzygyConfig};
use tempo_bot::events::{
    ClockSpec, GameFull, GameState, GameStatus, PlayerInfo, Variant,
};

/// Counters shared between a test and the mock it handed to the session.
#[derive(Clone, Default)]
pub struct MockProbe {
    pub searches: Arc<AtomicUsize>,
    pub analyses: Arc<AtomicUsize>,
    pub ponders: Arc<AtomicUsize>,
    options: Arc<std::sync::Mutex<Vec<(String, String)>>>,
    in_flight: Arc<AtomicBool>,
    overlap: Arc<AtomicBool>,
}

impl MockProbe {
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn analysis_count(&self) -> usize {
        self.analyses.load(Ordering::SeqCst)
    }

    /// Number of `go infinite` pondering sessions started.
    pub fn ponder_count(&self) -> usize {
        self.ponders.load(Ordering::SeqCst)
    }

    /// Every option the session tried to set, in order.
    pub fn options_set(&self) -> Vec<(String, String)> {
        self.options.lock().unwrap().clone()
    }

    /// True if two searches ever ran concurrently.
    pub fn overlapped(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }
}

/// Clears the in-flight marker even when the search future is cancelled.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Search backend double: plays a legal move after a configurable delay and
/// records call counts plus any concurrent use.
pub struct MockBackend {
    pub probe: MockProbe,
    pub delay: Duration,
    /// Depth reported for primary searches; `None` mimics an engine whose
    /// bestmove arrived without any `info depth` line.
    pub depth: Option<u32>,
    /// Centipawn score reported for primary searches.
    pub score: i32,
    /// Forced best move; falls back to the first legal move when unset.
    pub best: Option<String>,
    /// Bounded-analysis result: (candidate move, score).
    pub deeper: Option<(String, Score)>,
    /// Fail every `setoption`, like an engine that knows none of them.
    pub reject_options: bool,
}

impl MockBackend {
    pub fn new(probe: MockProbe) -> Self {
        Self {
            probe,
            delay: Duration::from_millis(5),
            depth: Some(20),
            score: 25,
            best: None,
            deeper: None,
            reject_options: false,
        }
    }
}

pub fn first_legal(fen: &str) -> String {
    let pos: Chess = fen
        .parse::<Fen>()
        .unwrap()
        .into_position(CastlingMode::Standard)
        .unwrap();
    pos.legal_moves()
        .first()
        .map(|m| m.to_uci(CastlingMode::Standard).to_string())
        .unwrap_or_else(|| "0000".to_string())
}

#[async_trait]
impl SearchBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn has_option(&self, _name: &str) -> bool {
        true
    }

    async fn set_option(&mut self, name: &str, value: &str) -> Result<(), UciError> {
        if self.reject_options {
            return Err(UciError::Protocol(format!("unknown option {name}")));
        }
        self.probe
            .options
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    async fn play(&mut self, fen: &str, _limit: &Limit) -> Result<PlayResult, UciError> {
        if self.probe.in_flight.swap(true, Ordering::SeqCst) {
            self.probe.overlap.store(true, Ordering::SeqCst);
        }
        let _guard = InFlight(self.probe.in_flight.clone());
        self.probe.searches.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        let best_move = self.best.clone().unwrap_or_else(|| first_legal(fen));
        Ok(PlayResult {
            best_move,
            ponder: None,
            info: SearchInfo {
                depth: self.depth,
                score: Some(Score::Cp(self.score)),
                ..SearchInfo::default()
            },
        })
    }

    async fn analyse(&mut self, fen: &str, _limit: &Limit) -> Result<SearchInfo, UciError> {
        self.probe.analyses.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        match &self.deeper {
            Some((candidate, score)) => Ok(SearchInfo {
                depth: Some(30),
                score: Some(*score),
                pv: vec![candidate.clone()],
                ..SearchInfo::default()
            }),
            None => Ok(SearchInfo {
                depth: Some(30),
                score: Some(Score::Cp(self.score)),
                pv: vec![first_legal(fen)],
                ..SearchInfo::default()
            }),
        }
    }

    async fn start_analysis(&mut self, _fen: &str) -> Result<(), UciError> {
        self.probe.ponders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_analysis(&mut self) -> Result<(), UciError> {
        Ok(())
    }

    async fn halt(&mut self) -> Result<(), UciError> {
        Ok(())
    }

    async fn quit(&mut self) {}
}

pub fn test_config() -> BotConfig {
    BotConfig {
        username: "tester".to_string(),
        engine_path: "/bin/false".to_string(),
        ponder: false,
        auto_tune: false,
        move_overhead_multiplier: 1.0,
        fixed_move_time: None,
        fixed_depth: None,
        fixed_nodes: None,
        uci_options: Vec::new(),
        max_takebacks: 1,
        draw: DrawConfig {
            enabled: false,
            min_fullmoves: 30,
            max_abs_cp: 10,
        },
        resign: ResignConfig {
            enabled: false,
            score_cp: -1000,
        },
        syzygy: SyzygyConfig {
            enabled: false,
            paths: Vec::new(),
            probe_depth: 1,
            max_pieces: 6,
        },
    }
}

fn player(name: &str) -> PlayerInfo {
    PlayerInfo {
        name: Some(name.to_string()),
        ..PlayerInfo::default()
    }
}

/// Full-state event for a 3+0 blitz game.
pub fn game_full(white: &str, black: &str) -> GameFull {
    GameFull {
        id: "testgame".to_string(),
        rated: false,
        variant: Variant {
            key: "standard".to_string(),
            name: Some("Standard".to_string()),
        },
        clock: Some(ClockSpec {
            initial: 180_000,
            increment: 0,
        }),
        initial_fen: None,
        white: player(white),
        black: player(black),
        state: game_state(""),
    }
}

pub fn game_state(moves: &str) -> GameState {
    GameState {
        moves: moves.to_string(),
        wtime: 180_000,
        btime: 180_000,
        winc: 0,
        binc: 0,
        status: GameStatus::Started,
        winner: None,
        wdraw: false,
        bdraw: false,
        wtakeback: false,
        btakeback: false,
    }
}

pub fn terminal_state(moves: &str, status: GameStatus, winner: Option<&str>) -> GameState {
    GameState {
        status,
        winner: winner.map(String::from),
        ..game_state(moves)
    }
}
