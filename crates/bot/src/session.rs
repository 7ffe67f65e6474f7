//! Event-driven game session.
//!
//! Consumes the ordered event stream for a single game, keeps the derived
//! state current, and launches at most one move computation at a time as a
//! cancellable background task. All outbound actions are dispatched
//! fire-and-forget so event consumption never blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uci_client::SearchBackend;

use crate::actions::{dispatch, ActionTx, OutboundAction};
use crate::config::BotConfig;
use crate::error::BotError;
use crate::events::{GameEvent, GameState, GameStatus};
use crate::game::{classify_result, GameCtx, GameInfo, GameResult};
use crate::presenter::Presenter;
use crate::resources;
use crate::scheduler::{MoveScheduler, SchedulerConfig, TimeControlCategory};
use crate::watchdog;

/// Grace before aborting a game a fellow bot never started.
const BOT_ABORT_GRACE: Duration = Duration::from_secs(30);
/// Humans get longer.
const HUMAN_ABORT_GRACE: Duration = Duration::from_secs(60);

/// Whether to accept an opponent's draw offer.
pub trait DrawPolicy: Send + Sync {
    /// `position_level` reports the scheduler's view: the evaluation has
    /// been inside the configured draw window long enough.
    fn accept_draw(&self, ctx: &GameCtx, position_level: bool) -> bool;
}

/// Accept exactly when the scheduler itself would offer. With draw offers
/// disabled in the configuration this declines everything.
pub struct EvalDrawPolicy;

impl DrawPolicy for EvalDrawPolicy {
    fn accept_draw(&self, _ctx: &GameCtx, position_level: bool) -> bool {
        position_level
    }
}

/// Whether to offer a rematch once a game finishes normally.
pub trait RematchPolicy: Send + Sync {
    fn offer_rematch(&self, info: &GameInfo, result: &GameResult) -> bool;
}

pub struct NeverRematch;

impl RematchPolicy for NeverRematch {
    fn offer_rematch(&self, _info: &GameInfo, _result: &GameResult) -> bool {
        false
    }
}

/// State shared between the session loop and its background tasks.
pub struct Shared {
    pub ctx: Mutex<GameCtx>,
    pub scheduler: Mutex<MoveScheduler>,
    /// Idempotence cache: the last computed decision, keyed by position.
    pub last: Mutex<Option<(String, crate::scheduler::MoveDecision)>>,
    /// Set when our last move carried a draw offer; cleared when the
    /// server-side flag disappears.
    pub we_offered_draw: AtomicBool,
    /// Scheduler's latest draw verdict, refreshed after each search so the
    /// event loop can answer offers without contending for the engine.
    pub position_level: AtomicBool,
    /// A move task hit an unrecoverable condition; the loop picks this up.
    pub fatal: Mutex<Option<BotError>>,
}

impl Shared {
    pub fn new(ctx: GameCtx, scheduler: MoveScheduler) -> Self {
        Self {
            ctx: Mutex::new(ctx),
            scheduler: Mutex::new(scheduler),
            last: Mutex::new(None),
            we_offered_draw: AtomicBool::new(false),
            position_level: AtomicBool::new(false),
            fatal: Mutex::new(None),
        }
    }
}

/// Compute (or reuse) the move for the current position.
///
/// Idempotent: a second call against an unchanged board returns the cached
/// decision without touching the engine.
pub async fn compute_move(shared: &Shared) -> Result<crate::scheduler::MoveDecision, BotError> {
    let ctx = shared.ctx.lock().await.clone();
    let fen = ctx.fen();

    {
        let last = shared.last.lock().await;
        if let Some((cached_fen, decision)) = last.as_ref() {
            if *cached_fen == fen {
                debug!("position unchanged, reusing computed move");
                return Ok(decision.clone());
            }
        }
    }

    let decision = {
        let mut scheduler = shared.scheduler.lock().await;
        let decision = scheduler.request_move(&ctx).await?;
        shared
            .position_level
            .store(scheduler.draw_acceptable(&ctx), Ordering::Relaxed);
        decision
    };
    *shared.last.lock().await = Some((fen, decision.clone()));
    Ok(decision)
}

/// One game from first event to terminal status.
pub struct GameSession {
    config: BotConfig,
    engine: Option<Box<dyn SearchBackend>>,
    events: mpsc::UnboundedReceiver<GameEvent>,
    actions: ActionTx,
    presenter: Arc<dyn Presenter>,
    draw_policy: Box<dyn DrawPolicy>,
    rematch_policy: Box<dyn RematchPolicy>,
    abort_grace: Option<Duration>,

    move_task: Option<JoinHandle<()>>,
    abort_task: Option<JoinHandle<()>>,
    takebacks_granted: u32,
    max_takebacks: u32,
    opp_draw_flag: bool,
    opp_takeback_flag: bool,
    /// No board update handled yet; the first one may start activity even
    /// though nothing "changed" relative to the initial position.
    first_update: bool,
}

impl GameSession {
    pub fn new(
        config: BotConfig,
        engine: Box<dyn SearchBackend>,
        events: mpsc::UnboundedReceiver<GameEvent>,
        actions: ActionTx,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let max_takebacks = config.max_takebacks;
        Self {
            config,
            engine: Some(engine),
            events,
            actions,
            presenter,
            draw_policy: Box::new(EvalDrawPolicy),
            rematch_policy: Box::new(NeverRematch),
            abort_grace: None,
            move_task: None,
            abort_task: None,
            takebacks_granted: 0,
            max_takebacks,
            opp_draw_flag: false,
            opp_takeback_flag: false,
            first_update: true,
        }
    }

    pub fn with_draw_policy(mut self, policy: Box<dyn DrawPolicy>) -> Self {
        self.draw_policy = policy;
        self
    }

    pub fn with_rematch_policy(mut self, policy: Box<dyn RematchPolicy>) -> Self {
        self.rematch_policy = policy;
        self
    }

    /// Override the abortion-timer grace period.
    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = Some(grace);
        self
    }

    pub async fn run(mut self) -> Result<(), BotError> {
        let full = loop {
            match self.events.recv().await {
                Some(GameEvent::GameFull(full)) => break full,
                Some(other) => debug!(kind = other.kind(), "event before game start, ignoring"),
                None => return Err(BotError::StreamClosed),
            }
        };

        let info = GameInfo::from_game_full(&full, &self.config.username);
        self.presenter.game_started(&info);

        let category = TimeControlCategory::classify(info.initial_sec, info.increment_sec);
        let engine = self
            .engine
            .take()
            .ok_or(BotError::Config("session started twice"))?;

        if info.opponent_is_bot() {
            // bots never get takebacks and do not need a long abort grace
            self.max_takebacks = 0;
        }
        let grace = self.abort_grace.unwrap_or(if info.opponent_is_bot() {
            BOT_ABORT_GRACE
        } else {
            HUMAN_ABORT_GRACE
        });

        let ctx = GameCtx::new(info)?;
        let mut scheduler =
            MoveScheduler::new(engine, SchedulerConfig::from(&self.config), category);
        scheduler.configure(&resources::detect()).await;
        info!(
            engine = scheduler.engine_name(),
            category = ?scheduler.category(),
            "engine ready"
        );

        let shared = Arc::new(Shared::new(ctx, scheduler));

        self.abort_task = Some(tokio::spawn(watchdog::abortion_timer(
            grace,
            shared.clone(),
            self.actions.clone(),
            self.presenter.clone(),
        )));

        if self.step(&shared, &full.state).await? {
            return Ok(());
        }

        loop {
            if let Some(err) = shared.fatal.lock().await.take() {
                error!(error = %err, "session is unrecoverable");
                self.teardown(&shared).await;
                return Err(err);
            }

            let Some(event) = self.events.recv().await else {
                warn!("event stream closed before a terminal status");
                self.teardown(&shared).await;
                return Err(BotError::StreamClosed);
            };

            match event {
                GameEvent::GameFull(full) => {
                    if self.step(&shared, &full.state).await? {
                        return Ok(());
                    }
                }
                GameEvent::GameState(state) => {
                    if self.step(&shared, &state).await? {
                        return Ok(());
                    }
                }
                GameEvent::ChatLine(line) => self.presenter.chat(&line),
                GameEvent::OpponentGone(gone) => {
                    if gone.gone && gone.claim_win_in_seconds == Some(0) {
                        info!("opponent is gone, claiming victory");
                        dispatch(&self.actions, OutboundAction::ClaimVictory);
                    }
                }
            }
        }
    }

    /// Process one state event, tearing the session down if it errors.
    /// Returns true once the session is finished.
    async fn step(&mut self, shared: &Arc<Shared>, state: &GameState) -> Result<bool, BotError> {
        match self.handle_state(shared, state).await {
            Ok(done) => Ok(done),
            Err(err) => {
                self.teardown(shared).await;
                Err(err)
            }
        }
    }

    async fn handle_state(
        &mut self,
        shared: &Arc<Shared>,
        state: &GameState,
    ) -> Result<bool, BotError> {
        if state.status != GameStatus::Started {
            self.finish(shared, state).await;
            return Ok(true);
        }

        self.handle_draw_flags(shared, state).await;
        let took_back = self.handle_takeback_flags(shared, state).await?;

        let (changed, our_turn) = {
            let mut ctx = shared.ctx.lock().await;
            if took_back {
                // the event's move list still contains the undone ply
                ctx.update_clocks(state);
                (false, ctx.is_our_turn())
            } else {
                let changed = ctx.update(state)?;
                (changed, ctx.is_our_turn())
            }
        };

        let task_active = self
            .move_task
            .as_ref()
            .is_some_and(|task| !task.is_finished());

        let first_update = std::mem::take(&mut self.first_update);
        if our_turn && !task_active && (changed || first_update) {
            self.spawn_move_task(shared);
        } else if !our_turn && !task_active && (changed || first_update) {
            // re-point any background analysis at the new position
            let mut scheduler = shared.scheduler.lock().await;
            scheduler.stop_pondering().await;
            scheduler.start_pondering(&*shared.ctx.lock().await).await;
        }

        Ok(false)
    }

    async fn handle_draw_flags(&mut self, shared: &Arc<Shared>, state: &GameState) {
        let ctx = shared.ctx.lock().await;
        let (our_flag, opp_flag) = match ctx.info.our_color {
            shakmaty::Color::White => (state.wdraw, state.bdraw),
            shakmaty::Color::Black => (state.bdraw, state.wdraw),
        };
        drop(ctx);

        if !our_flag {
            shared.we_offered_draw.store(false, Ordering::Relaxed);
        }

        let new_offer = opp_flag && !self.opp_draw_flag;
        self.opp_draw_flag = opp_flag;
        if !new_offer || shared.we_offered_draw.load(Ordering::Relaxed) {
            return;
        }

        // answered from cached state: never waits on an in-flight search
        let accept = {
            let ctx = shared.ctx.lock().await;
            let level = shared.position_level.load(Ordering::Relaxed);
            self.draw_policy.accept_draw(&ctx, level)
        };
        info!(accept, "opponent offered a draw");
        dispatch(
            &self.actions,
            if accept {
                OutboundAction::AcceptDraw
            } else {
                OutboundAction::DeclineDraw
            },
        );
    }

    /// Returns true when a takeback was granted and the board rolled back.
    async fn handle_takeback_flags(
        &mut self,
        shared: &Arc<Shared>,
        state: &GameState,
    ) -> Result<bool, BotError> {
        let opp_flag = {
            let ctx = shared.ctx.lock().await;
            match ctx.info.our_color {
                shakmaty::Color::White => state.btakeback,
                shakmaty::Color::Black => state.wtakeback,
            }
        };

        let new_request = opp_flag && !self.opp_takeback_flag;
        self.opp_takeback_flag = opp_flag;
        if !new_request {
            return Ok(false);
        }

        if self.takebacks_granted >= self.max_takebacks {
            info!(
                granted = self.takebacks_granted,
                "takeback limit reached, declining"
            );
            dispatch(&self.actions, OutboundAction::DeclineTakeback);
            return Ok(false);
        }

        self.cancel_move_task(shared).await;
        shared.ctx.lock().await.takeback()?;
        *shared.last.lock().await = None;
        self.takebacks_granted += 1;
        info!(granted = self.takebacks_granted, "takeback accepted");
        dispatch(&self.actions, OutboundAction::AcceptTakeback);
        Ok(true)
    }

    fn spawn_move_task(&mut self, shared: &Arc<Shared>) {
        let shared = shared.clone();
        let actions = self.actions.clone();
        let presenter = self.presenter.clone();

        self.move_task = Some(tokio::spawn(async move {
            match compute_move(&shared).await {
                Ok(decision) => {
                    if decision.resign {
                        info!("position is lost, resigning");
                        dispatch(&actions, OutboundAction::Resign);
                        return;
                    }
                    if decision.offer_draw {
                        shared.we_offered_draw.store(true, Ordering::Relaxed);
                    }
                    presenter.move_played(&decision);
                    dispatch(
                        &actions,
                        OutboundAction::Move {
                            uci: decision.uci,
                            offer_draw: decision.offer_draw,
                        },
                    );
                }
                Err(err) => {
                    error!(error = %err, "move computation failed");
                    *shared.fatal.lock().await = Some(err);
                }
            }
        }));
    }

    /// Abort an in-flight move task and leave the engine idle.
    async fn cancel_move_task(&mut self, shared: &Arc<Shared>) {
        let Some(task) = self.move_task.take() else {
            return;
        };
        if task.is_finished() {
            return;
        }
        task.abort();
        let _ = task.await;
        // the task may have been cut off mid-search
        shared.scheduler.lock().await.halt().await;
    }

    async fn finish(&mut self, shared: &Arc<Shared>, state: &GameState) {
        self.cancel_move_task(shared).await;
        if let Some(task) = self.abort_task.take() {
            task.abort();
        }

        let (result, offer_rematch) = {
            let ctx = shared.ctx.lock().await;
            let result = classify_result(state, &ctx);
            self.presenter.game_finished(&ctx.info, &result);
            let offer = !result.aborted && self.rematch_policy.offer_rematch(&ctx.info, &result);
            (result, offer)
        };
        debug!(?result, "session finished");
        if offer_rematch {
            dispatch(&self.actions, OutboundAction::OfferRematch);
        }

        shared.scheduler.lock().await.close().await;
    }

    async fn teardown(&mut self, shared: &Arc<Shared>) {
        self.cancel_move_task(shared).await;
        if let Some(task) = self.abort_task.take() {
            task.abort();
        }
        shared.scheduler.lock().await.close().await;
    }
}
