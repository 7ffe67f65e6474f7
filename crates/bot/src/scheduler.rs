//! Adaptive move scheduling on top of a search backend.
//!
//! Owns the engine handle for a session: configuration, clock-aware time
//! budgeting, the primary search plus the fallback deepening pass, draw and
//! resign bookkeeping, and background analysis while the opponent thinks.

use std::time::Duration;

use shakmaty::{CastlingMode, Position};
use tracing::{debug, info, warn};
use uci_client::{Limit, PlayResult, Score, SearchBackend, SearchInfo};

use crate::config::{BotConfig, DrawConfig, ResignConfig, SyzygyConfig};
use crate::error::BotError;
use crate::game::GameCtx;
use crate::resources::{self, EngineRole, SystemResources};

/// Options the scheduler sets itself; user-supplied values for these are
/// ignored.
const MANAGED_OPTIONS: &[&str] = &["Ponder", "UCI_Chess960", "UCI_Variant", "UCI_AnalyseMode"];

/// Consecutive level evaluations before a draw offer is considered.
const DRAW_CONSECUTIVE: u32 = 5;
/// Consecutive lost evaluations before resigning.
const RESIGN_CONSECUTIVE: u32 = 3;

/// Coarse time-control bucket selecting the scheduling heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControlCategory {
    Hyperbullet,
    Bullet,
    Blitz,
    Rapid,
    Classical,
}

impl TimeControlCategory {
    pub fn classify(initial_sec: f64, increment_sec: f64) -> Self {
        if initial_sec <= 60.0 {
            Self::Hyperbullet
        } else if initial_sec <= 120.0 || (initial_sec <= 180.0 && increment_sec <= 1.0) {
            Self::Bullet
        } else if initial_sec <= 600.0 || (initial_sec <= 900.0 && increment_sec <= 2.0) {
            Self::Blitz
        } else if initial_sec <= 3600.0 {
            Self::Rapid
        } else {
            Self::Classical
        }
    }

    pub fn is_fast(self) -> bool {
        matches!(self, Self::Hyperbullet | Self::Bullet)
    }

    /// Per-category `(base_frac, cap)` for the base budget.
    fn base_params(self) -> (f64, f64) {
        match self {
            Self::Hyperbullet => (0.006, 0.05),
            Self::Bullet => (0.015, 0.12),
            Self::Blitz => (0.06, 1.2),
            Self::Rapid => (0.12, 4.0),
            Self::Classical => (0.20, 12.0),
        }
    }

    /// A primary result below this depth is suspect in a sharp position.
    fn shallow_depth(self) -> u32 {
        match self {
            Self::Hyperbullet | Self::Bullet | Self::Blitz => 10,
            Self::Rapid | Self::Classical => 18,
        }
    }
}

/// Per-move time budget in seconds.
///
/// Base budget plus a capped increment bonus, boosted in sharp positions,
/// divided by the overhead multiplier, then clamped by the fixed limit and
/// the fast-game emergency caps.
pub fn think_time(
    our_clock: Duration,
    increment: Duration,
    category: TimeControlCategory,
    tactical_score: usize,
    in_check: bool,
    overhead_multiplier: f64,
    fixed_limit: Option<f64>,
) -> f64 {
    let clock = our_clock.as_secs_f64();
    let inc = increment.as_secs_f64();
    let (base_frac, cap) = category.base_params();

    let mut t = clock * base_frac + cap.min(inc * 2.0);

    if tactical_score >= 3 || in_check {
        t *= if category.is_fast() { 1.4 } else { 1.8 };
    }

    if overhead_multiplier > 0.0 {
        t /= overhead_multiplier;
    }

    if let Some(limit) = fixed_limit {
        t = t.min(limit);
    }

    if category.is_fast() {
        t = if clock > 30.0 {
            t.clamp(0.03, 0.35)
        } else if clock > 3.0 {
            t.clamp(0.02, 0.12)
        } else {
            0.01
        };
    }

    t = t.max(0.001);
    // the emergency floors may not override an explicit per-move limit
    if let Some(limit) = fixed_limit {
        if limit > 0.0 {
            t = t.min(limit);
        }
    }
    t
}

/// Prefer the deepened candidate unless the original evaluation is present,
/// comparable and strictly better from the side to move's perspective.
pub fn prefer_candidate(original: Option<Score>, candidate: Option<Score>) -> bool {
    match (original, candidate) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(orig), Some(cand)) => cand.signed_value() >= orig.signed_value(),
    }
}

/// Scheduling knobs, extracted from the bot configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub ponder: bool,
    pub auto_tune: bool,
    pub move_overhead_multiplier: f64,
    pub fixed_move_time: Option<f64>,
    pub fixed_depth: Option<u32>,
    pub fixed_nodes: Option<u64>,
    pub uci_options: Vec<(String, String)>,
    pub draw: DrawConfig,
    pub resign: ResignConfig,
    pub syzygy: SyzygyConfig,
}

impl From<&BotConfig> for SchedulerConfig {
    fn from(config: &BotConfig) -> Self {
        Self {
            ponder: config.ponder,
            auto_tune: config.auto_tune,
            move_overhead_multiplier: config.move_overhead_multiplier,
            fixed_move_time: config.fixed_move_time,
            fixed_depth: config.fixed_depth,
            fixed_nodes: config.fixed_nodes,
            uci_options: config.uci_options.clone(),
            draw: config.draw.clone(),
            resign: config.resign.clone(),
            syzygy: config.syzygy.clone(),
        }
    }
}

/// A scheduled move plus the flags the session should dispatch with it.
#[derive(Debug, Clone)]
pub struct MoveDecision {
    pub uci: String,
    pub offer_draw: bool,
    pub resign: bool,
    pub info: Option<SearchInfo>,
}

/// Drives one engine handle for one game.
pub struct MoveScheduler {
    engine: Box<dyn SearchBackend>,
    config: SchedulerConfig,
    category: TimeControlCategory,
    pondering: bool,
    level_streak: u32,
    losing_streak: u32,
}

impl MoveScheduler {
    pub fn new(
        engine: Box<dyn SearchBackend>,
        config: SchedulerConfig,
        category: TimeControlCategory,
    ) -> Self {
        Self {
            engine,
            config,
            category,
            pondering: false,
            level_streak: 0,
            losing_streak: 0,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn category(&self) -> TimeControlCategory {
        self.category
    }

    /// Apply user options, tuning defaults and tablebase paths. Options the
    /// engine never advertised, or that it rejects, are logged and skipped;
    /// configuration is never fatal.
    pub async fn configure(&mut self, resources: &SystemResources) {
        let user_names: Vec<String> = self
            .config
            .uci_options
            .iter()
            .map(|(n, _)| n.clone())
            .collect();
        let user_set =
            |name: &str| user_names.iter().any(|n| n.eq_ignore_ascii_case(name));

        if self.config.auto_tune {
            let role = if self.category.is_fast() {
                EngineRole::Fast
            } else {
                EngineRole::Standard
            };
            let (threads, hash) = resources::recommended_threads_and_hash(role, resources);
            // each knob tunes independently; an explicit value wins
            if !user_set("Threads") && self.engine.has_option("Threads") {
                self.try_set("Threads", &threads.to_string()).await;
            }
            if !user_set("Hash") && self.engine.has_option("Hash") {
                self.try_set("Hash", &hash.to_string()).await;
            }
            info!(threads, hash, "tuned engine to host resources");
        }

        if self.config.syzygy.enabled && self.engine.has_option("SyzygyPath") {
            let paths = self.config.syzygy.paths.join(":");
            self.try_set("SyzygyPath", &paths).await;
            if self.engine.has_option("SyzygyProbeDepth") {
                let depth = self.config.syzygy.probe_depth.to_string();
                self.try_set("SyzygyProbeDepth", &depth).await;
            }
            if self.engine.has_option("SyzygyProbeLimit") {
                let pieces = self.config.syzygy.max_pieces.to_string();
                self.try_set("SyzygyProbeLimit", &pieces).await;
            }
        }

        if self.engine.has_option("MultiPV") && !user_set("MultiPV") {
            self.try_set("MultiPV", "1").await;
        }

        let options = self.config.uci_options.clone();
        for (name, value) in &options {
            if MANAGED_OPTIONS.iter().any(|m| m.eq_ignore_ascii_case(name)) {
                debug!(option = %name, "option is managed internally, ignoring");
                continue;
            }
            if !self.engine.has_option(name) {
                warn!(option = %name, "engine does not support option, skipping");
                continue;
            }
            self.try_set(name, value).await;
        }
    }

    async fn try_set(&mut self, name: &str, value: &str) {
        if let Err(err) = self.engine.set_option(name, value).await {
            warn!(option = %name, error = %err, "engine rejected option, skipping");
        }
    }

    /// Search the current position within the computed budget.
    ///
    /// A search failure falls back to an arbitrary legal move; only a
    /// position with no legal moves at all is fatal.
    pub async fn request_move(&mut self, ctx: &GameCtx) -> Result<MoveDecision, BotError> {
        self.stop_pondering().await;

        let tactical_score = ctx.tactical_score();
        let in_check = ctx.in_check();
        let budget = think_time(
            ctx.our_clock(),
            ctx.clock.increment,
            self.category,
            tactical_score,
            in_check,
            self.config.move_overhead_multiplier,
            self.config.fixed_move_time,
        );

        let limit = Limit {
            movetime: Some(Duration::from_secs_f64(budget)),
            depth: self.config.fixed_depth,
            nodes: self.config.fixed_nodes,
            white_time: Some(ctx.clock.white),
            black_time: Some(ctx.clock.black),
            white_inc: Some(ctx.clock.increment),
            black_inc: Some(ctx.clock.increment),
        };

        let fen = ctx.fen();
        let primary = match self.engine.play(&fen, &limit).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "search failed, playing an arbitrary legal move");
                let mv = ctx.any_legal_move().ok_or(BotError::NoLegalMoves)?;
                return Ok(MoveDecision {
                    uci: mv.to_uci(CastlingMode::Standard).to_string(),
                    offer_draw: false,
                    resign: false,
                    info: None,
                });
            }
        };

        let result = self
            .deepen_if_shallow(&fen, primary, budget, tactical_score, in_check)
            .await;

        self.record_score(result.info.score);
        let offer_draw = self.draw_acceptable(ctx);
        let resign = self.should_resign();

        debug!(
            uci = %result.best_move,
            depth = ?result.info.depth,
            score = ?result.info.score,
            budget_ms = (budget * 1000.0) as u64,
            "move scheduled"
        );

        Ok(MoveDecision {
            uci: result.best_move,
            offer_draw,
            resign,
            info: Some(result.info),
        })
    }

    /// One bounded secondary analysis when the primary search came back
    /// shallow in a sharp position.
    async fn deepen_if_shallow(
        &mut self,
        fen: &str,
        primary: PlayResult,
        budget: f64,
        tactical_score: usize,
        in_check: bool,
    ) -> PlayResult {
        // a result without a reported depth counts as shallow
        let depth = primary.info.depth.unwrap_or(0);
        if depth >= self.category.shallow_depth() || (tactical_score < 2 && !in_check) {
            return primary;
        }

        let extra = if self.category.is_fast() {
            budget * 1.2
        } else {
            (budget * 2.5).max(1.0).min(12.0)
        };
        let limit = Limit::movetime(Duration::from_secs_f64(extra));

        let deeper = match self.engine.analyse(fen, &limit).await {
            Ok(info) => info,
            Err(err) => {
                warn!(error = %err, "fallback deepening failed, keeping primary move");
                return primary;
            }
        };

        match deeper.pv.first() {
            Some(candidate)
                if *candidate != primary.best_move
                    && prefer_candidate(primary.info.score, deeper.score) =>
            {
                info!(
                    from = %primary.best_move,
                    to = %candidate,
                    "fallback deepening replaced shallow move"
                );
                PlayResult {
                    best_move: candidate.clone(),
                    ponder: None,
                    info: deeper,
                }
            }
            _ => primary,
        }
    }

    fn record_score(&mut self, score: Option<Score>) {
        match score {
            Some(score) => {
                let value = score.signed_value();
                if !score.is_mate() && value.abs() <= i64::from(self.config.draw.max_abs_cp) {
                    self.level_streak += 1;
                } else {
                    self.level_streak = 0;
                }
                if value <= i64::from(self.config.resign.score_cp) {
                    self.losing_streak += 1;
                } else {
                    self.losing_streak = 0;
                }
            }
            None => {
                self.level_streak = 0;
                self.losing_streak = 0;
            }
        }
    }

    /// The position has been dead level long enough that a draw is fine.
    pub fn draw_acceptable(&self, ctx: &GameCtx) -> bool {
        self.config.draw.enabled
            && u32::from(ctx.position().fullmoves()) >= self.config.draw.min_fullmoves
            && self.level_streak >= DRAW_CONSECUTIVE
    }

    pub fn should_resign(&self) -> bool {
        self.config.resign.enabled && self.losing_streak >= RESIGN_CONSECUTIVE
    }

    /// Analyse in the background while the opponent thinks.
    pub async fn start_pondering(&mut self, ctx: &GameCtx) {
        if !self.config.ponder || self.pondering {
            return;
        }
        match self.engine.start_analysis(&ctx.fen()).await {
            Ok(()) => self.pondering = true,
            Err(err) => warn!(error = %err, "could not start pondering"),
        }
    }

    pub async fn stop_pondering(&mut self) {
        if !self.pondering {
            return;
        }
        self.pondering = false;
        if let Err(err) = self.engine.stop_analysis().await {
            warn!(error = %err, "could not stop pondering cleanly");
        }
    }

    /// Interrupt whatever the engine is doing. Called when an in-flight
    /// move task was cancelled from outside.
    pub async fn halt(&mut self) {
        self.pondering = false;
        if let Err(err) = self.engine.halt().await {
            warn!(error = %err, "could not halt engine");
        }
    }

    pub async fn close(&mut self) {
        self.engine.quit().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_time_control() {
        use TimeControlCategory::*;
        assert_eq!(TimeControlCategory::classify(30.0, 0.0), Hyperbullet);
        assert_eq!(TimeControlCategory::classify(60.0, 0.0), Hyperbullet);
        assert_eq!(TimeControlCategory::classify(120.0, 1.0), Bullet);
        assert_eq!(TimeControlCategory::classify(180.0, 1.0), Bullet);
        assert_eq!(TimeControlCategory::classify(180.0, 2.0), Blitz);
        assert_eq!(TimeControlCategory::classify(600.0, 0.0), Blitz);
        assert_eq!(TimeControlCategory::classify(900.0, 2.0), Blitz);
        assert_eq!(TimeControlCategory::classify(900.0, 10.0), Rapid);
        assert_eq!(TimeControlCategory::classify(3600.0, 0.0), Rapid);
        assert_eq!(TimeControlCategory::classify(5400.0, 30.0), Classical);
    }

    #[test]
    fn test_think_time_bullet_emergency_floor() {
        // own clock at 2s: fixed 10ms regardless of anything else
        let t = think_time(
            Duration::from_secs(2),
            Duration::from_secs(1),
            TimeControlCategory::Bullet,
            5,
            true,
            1.0,
            None,
        );
        assert_eq!(t, 0.01);
    }

    #[test]
    fn test_think_time_bullet_caps() {
        let t = think_time(
            Duration::from_secs(60),
            Duration::ZERO,
            TimeControlCategory::Bullet,
            0,
            false,
            1.0,
            None,
        );
        assert!((0.03..=0.35).contains(&t));

        let t = think_time(
            Duration::from_secs(10),
            Duration::ZERO,
            TimeControlCategory::Bullet,
            0,
            false,
            1.0,
            None,
        );
        assert!((0.02..=0.12).contains(&t));
    }

    #[test]
    fn test_think_time_tactical_boost() {
        let calm = think_time(
            Duration::from_secs(300),
            Duration::from_secs(2),
            TimeControlCategory::Blitz,
            0,
            false,
            1.0,
            None,
        );
        let sharp = think_time(
            Duration::from_secs(300),
            Duration::from_secs(2),
            TimeControlCategory::Blitz,
            4,
            false,
            1.0,
            None,
        );
        assert!((sharp / calm - 1.8).abs() < 1e-9);

        // in check alone triggers the boost too
        let checked = think_time(
            Duration::from_secs(300),
            Duration::from_secs(2),
            TimeControlCategory::Blitz,
            0,
            true,
            1.0,
            None,
        );
        assert_eq!(checked, sharp);
    }

    #[test]
    fn test_think_time_overhead_divides() {
        let plain = think_time(
            Duration::from_secs(600),
            Duration::ZERO,
            TimeControlCategory::Rapid,
            0,
            false,
            1.0,
            None,
        );
        let padded = think_time(
            Duration::from_secs(600),
            Duration::ZERO,
            TimeControlCategory::Rapid,
            0,
            false,
            2.0,
            None,
        );
        assert!((plain / padded - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_think_time_respects_fixed_limit_and_positivity() {
        for clock in [1_u64, 5, 40, 200, 2000] {
            for category in [
                TimeControlCategory::Hyperbullet,
                TimeControlCategory::Bullet,
                TimeControlCategory::Blitz,
                TimeControlCategory::Rapid,
                TimeControlCategory::Classical,
            ] {
                let t = think_time(
                    Duration::from_secs(clock),
                    Duration::from_secs(1),
                    category,
                    5,
                    true,
                    1.0,
                    Some(0.25),
                );
                assert!(t > 0.0);
                assert!(t <= 0.25);
            }
        }
    }

    #[test]
    fn test_prefer_candidate() {
        assert!(prefer_candidate(None, Some(Score::Cp(-50))));
        assert!(prefer_candidate(None, None));
        assert!(!prefer_candidate(Some(Score::Cp(10)), None));
        assert!(prefer_candidate(Some(Score::Cp(10)), Some(Score::Cp(10))));
        assert!(prefer_candidate(Some(Score::Cp(10)), Some(Score::Mate(3))));
        assert!(!prefer_candidate(Some(Score::Cp(10)), Some(Score::Mate(-3))));
        assert!(!prefer_candidate(Some(Score::Mate(2)), Some(Score::Cp(500))));
    }
}
