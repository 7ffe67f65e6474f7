//! User-facing output seam.
//!
//! The session never writes to the console directly; everything a human
//! should see goes through a `Presenter`. The default presenter renders to
//! the structured log.

use tracing::info;

use crate::events::ChatLine;
use crate::game::{GameInfo, GameResult};
use crate::scheduler::MoveDecision;

pub trait Presenter: Send + Sync {
    fn game_started(&self, info: &GameInfo);
    fn chat(&self, line: &ChatLine);
    fn move_played(&self, decision: &MoveDecision);
    /// Free-form notice, e.g. an abort explanation.
    fn notice(&self, text: &str);
    fn game_finished(&self, info: &GameInfo, result: &GameResult);
}

pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn game_started(&self, info: &GameInfo) {
        info!(
            game_id = %info.game_id,
            "{} vs {} ({}, {})",
            info.white_str(),
            info.black_str(),
            info.tc_format(),
            if info.rated { "rated" } else { "casual" },
        );
    }

    fn chat(&self, line: &ChatLine) {
        info!(room = %line.room, "[chat] {}: {}", line.username, line.text);
    }

    fn move_played(&self, decision: &MoveDecision) {
        match &decision.info {
            Some(diag) => info!(
                depth = ?diag.depth,
                score = ?diag.score.map(|s| s.to_string()),
                nodes = ?diag.nodes,
                "played {}",
                decision.uci,
            ),
            None => info!("played {} (fallback)", decision.uci),
        }
    }

    fn notice(&self, text: &str) {
        info!("{text}");
    }

    fn game_finished(&self, info: &GameInfo, result: &GameResult) {
        info!(game_id = %info.game_id, "{}", result.message);
        info!(
            "{} {} - {} {}",
            info.white_name, result.white_score, result.black_score, info.black_name,
        );
    }
}
