//! Search limits, scores and `info` line parsing

use std::fmt;
use std::time::Duration;

/// Search score relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Centipawn evaluation.
    Cp(i32),
    /// Mate in N moves (negative = the side to move gets mated).
    Mate(i32),
}

impl Score {
    /// Value on a single total order, with mate scores as signed infinities.
    /// Closer mates rank above farther ones.
    pub fn signed_value(&self) -> i64 {
        match *self {
            Score::Cp(cp) => cp as i64,
            Score::Mate(n) if n >= 0 => 1_000_000 - n as i64,
            Score::Mate(n) => -1_000_000 - n as i64,
        }
    }

    pub fn is_mate(&self) -> bool {
        matches!(self, Score::Mate(_))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Score::Cp(cp) => write!(f, "{cp}cp"),
            Score::Mate(n) => write!(f, "mate{n}"),
        }
    }
}

/// Accumulated diagnostics from the engine's `info` output.
#[derive(Debug, Clone, Default)]
pub struct SearchInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub score: Option<Score>,
    /// Principal variation in UCI notation.
    pub pv: Vec<String>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub time: Option<Duration>,
}

/// Result of a `play` call: the chosen move plus final diagnostics.
#[derive(Debug, Clone)]
pub struct PlayResult {
    /// Best move in UCI notation.
    pub best_move: String,
    /// Suggested ponder move, if the engine offered one.
    pub ponder: Option<String>,
    pub info: SearchInfo,
}

/// Bounds for a single search. Any combination of fields may be set; the
/// clock-aware fields let the engine see the real game clocks alongside a
/// hard movetime budget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Limit {
    pub movetime: Option<Duration>,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub white_time: Option<Duration>,
    pub black_time: Option<Duration>,
    pub white_inc: Option<Duration>,
    pub black_inc: Option<Duration>,
}

impl Limit {
    /// Limit with only a fixed movetime budget.
    pub fn movetime(budget: Duration) -> Self {
        Self {
            movetime: Some(budget),
            ..Self::default()
        }
    }

    /// Render as a UCI `go` command.
    pub(crate) fn to_go_command(&self) -> String {
        let mut cmd = String::from("go");
        if let Some(t) = self.white_time {
            cmd.push_str(&format!(" wtime {}", t.as_millis()));
        }
        if let Some(t) = self.black_time {
            cmd.push_str(&format!(" btime {}", t.as_millis()));
        }
        if let Some(t) = self.white_inc {
            cmd.push_str(&format!(" winc {}", t.as_millis()));
        }
        if let Some(t) = self.black_inc {
            cmd.push_str(&format!(" binc {}", t.as_millis()));
        }
        if let Some(d) = self.depth {
            cmd.push_str(&format!(" depth {d}"));
        }
        if let Some(n) = self.nodes {
            cmd.push_str(&format!(" nodes {n}"));
        }
        if let Some(t) = self.movetime {
            cmd.push_str(&format!(" movetime {}", t.as_millis()));
        }
        cmd
    }
}

/// Parse a UCI `info` line into structured diagnostics.
pub(crate) fn parse_info(line: &str) -> SearchInfo {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut out = SearchInfo::default();

    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "depth" => out.depth = tokens.get(i + 1).and_then(|t| t.parse().ok()),
            "seldepth" => out.seldepth = tokens.get(i + 1).and_then(|t| t.parse().ok()),
            "nodes" => out.nodes = tokens.get(i + 1).and_then(|t| t.parse().ok()),
            "nps" => out.nps = tokens.get(i + 1).and_then(|t| t.parse().ok()),
            "time" => {
                out.time = tokens
                    .get(i + 1)
                    .and_then(|t| t.parse().ok())
                    .map(Duration::from_millis);
            }
            "score" => {
                let value = tokens.get(i + 2).and_then(|t| t.parse().ok());
                out.score = match (tokens.get(i + 1), value) {
                    (Some(&"cp"), Some(v)) => Some(Score::Cp(v)),
                    (Some(&"mate"), Some(v)) => Some(Score::Mate(v)),
                    _ => None,
                };
                i += 2;
            }
            "pv" => {
                // PV runs to the end of the line or the next `string` payload
                out.pv = tokens[i + 1..]
                    .iter()
                    .take_while(|t| **t != "string")
                    .map(|t| t.to_string())
                    .collect();
                break;
            }
            _ => {}
        }
        i += 1;
    }

    out
}

/// Parse a `bestmove` line into (best, ponder).
pub(crate) fn parse_bestmove(line: &str) -> Option<(String, Option<String>)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.first() != Some(&"bestmove") {
        return None;
    }
    let best = parts.get(1)?.to_string();
    let ponder = if parts.get(2) == Some(&"ponder") {
        parts.get(3).map(|p| p.to_string())
    } else {
        None
    };
    Some((best, ponder))
}
