//! Bot configuration from environment variables

use std::env;

#[derive(Clone, Debug)]
pub struct BotConfig {
    /// Account name, used to determine our color from the first game event.
    pub username: String,

    /// Path to the UCI engine binary.
    pub engine_path: String,

    /// Analyse in the background while it is the opponent's turn.
    pub ponder: bool,

    /// Derive Threads/Hash defaults from host resources when not set.
    pub auto_tune: bool,

    /// Divides each computed time budget to compensate for latency.
    pub move_overhead_multiplier: f64,

    /// Hard per-move time limit in seconds.
    pub fixed_move_time: Option<f64>,

    /// Fixed search depth ceiling.
    pub fixed_depth: Option<u32>,

    /// Fixed search node ceiling.
    pub fixed_nodes: Option<u64>,

    /// Extra UCI options as `Name=Value;Name=Value`.
    pub uci_options: Vec<(String, String)>,

    /// Takebacks granted per game before we start declining.
    pub max_takebacks: u32,

    pub draw: DrawConfig,
    pub resign: ResignConfig,
    pub syzygy: SyzygyConfig,
}

/// When to offer or accept draws.
#[derive(Clone, Debug)]
pub struct DrawConfig {
    pub enabled: bool,
    /// Never consider a draw before this many full moves.
    pub min_fullmoves: u32,
    /// Evaluation window (centipawns, either side) counting as level.
    pub max_abs_cp: i32,
}

#[derive(Clone, Debug)]
pub struct ResignConfig {
    pub enabled: bool,
    /// Resign when our evaluation drops to this score or below.
    pub score_cp: i32,
}

/// Endgame tablebase probing.
#[derive(Clone, Debug)]
pub struct SyzygyConfig {
    pub enabled: bool,
    pub paths: Vec<String>,
    pub probe_depth: u32,
    pub max_pieces: u32,
}

impl BotConfig {
    /// Load configuration from environment variables, with defaults that
    /// make an unconfigured run behave sensibly.
    pub fn from_env() -> Self {
        Self {
            username: env::var("BOT_USERNAME").unwrap_or_else(|_| "tempo-bot".to_string()),
            engine_path: env::var("ENGINE_PATH")
                .unwrap_or_else(|_| "/usr/local/bin/stockfish".to_string()),
            ponder: flag(env::var("ENGINE_PONDER").ok().as_deref(), true),
            auto_tune: flag(env::var("ENGINE_AUTO_TUNE").ok().as_deref(), true),
            move_overhead_multiplier: env::var("MOVE_OVERHEAD_MULTIPLIER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            fixed_move_time: env::var("FIXED_MOVE_TIME").ok().and_then(|v| v.parse().ok()),
            fixed_depth: env::var("FIXED_DEPTH").ok().and_then(|v| v.parse().ok()),
            fixed_nodes: env::var("FIXED_NODES").ok().and_then(|v| v.parse().ok()),
            uci_options: parse_uci_options(
                &env::var("ENGINE_UCI_OPTIONS").unwrap_or_default(),
            ),
            max_takebacks: env::var("MAX_TAKEBACKS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            draw: DrawConfig {
                enabled: flag(env::var("DRAW_ENABLED").ok().as_deref(), false),
                min_fullmoves: env::var("DRAW_MIN_FULLMOVES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
                max_abs_cp: env::var("DRAW_MAX_CP")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
            resign: ResignConfig {
                enabled: flag(env::var("RESIGN_ENABLED").ok().as_deref(), false),
                score_cp: env::var("RESIGN_SCORE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(-1000),
            },
            syzygy: SyzygyConfig {
                enabled: flag(env::var("SYZYGY_ENABLED").ok().as_deref(), false),
                paths: env::var("SYZYGY_PATHS")
                    .unwrap_or_default()
                    .split(':')
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect(),
                probe_depth: env::var("SYZYGY_PROBE_DEPTH")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1),
                max_pieces: env::var("SYZYGY_MAX_PIECES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(6),
            },
        }
    }
}

fn flag(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if ["1", "true", "yes", "on"].contains(&v.as_str()) => true,
        Some(v) if ["0", "false", "no", "off"].contains(&v.as_str()) => false,
        _ => default,
    }
}

/// Parse `Name=Value;Name=Value` into option pairs; malformed entries are
/// dropped.
fn parse_uci_options(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|entry| {
            let (name, value) = entry.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
