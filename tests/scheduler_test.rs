//! Scheduler behavior against a scriptable search backend.

mod common;

use common::{game_full, game_state, test_config, MockBackend, MockProbe};
use tempo_bot::config::BotConfig;
use tempo_bot::game::{GameCtx, GameInfo};
use tempo_bot::resources::SystemResources;
use tempo_bot::scheduler::{MoveScheduler, SchedulerConfig, TimeControlCategory};
use tempo_bot::session::{compute_move, Shared};
use uci_client::Score;

fn ctx_with_moves(moves: &str) -> GameCtx {
    let info = GameInfo::from_game_full(&game_full("tester", "opp"), "tester");
    let mut ctx = GameCtx::new(info).unwrap();
    if !moves.is_empty() {
        ctx.update(&game_state(moves)).unwrap();
    }
    ctx
}

fn scheduler(backend: MockBackend, config: &BotConfig) -> MoveScheduler {
    MoveScheduler::new(
        Box::new(backend),
        SchedulerConfig::from(config),
        TimeControlCategory::Blitz,
    )
}

#[tokio::test]
async fn test_deepening_adopts_better_candidate_in_sharp_position() {
    // two captures available: a shallow primary result triggers deepening
    let ctx = ctx_with_moves("e2e4 d7d5 b1c3 e7e5");
    let config = test_config();

    let probe = MockProbe::default();
    let mut backend = MockBackend::new(probe.clone());
    backend.depth = Some(5);
    backend.best = Some("e4d5".to_string());
    backend.deeper = Some(("c3d5".to_string(), Score::Cp(80)));

    let mut scheduler = scheduler(backend, &config);
    let decision = scheduler.request_move(&ctx).await.unwrap();

    assert_eq!(decision.uci, "c3d5");
    assert_eq!(probe.analysis_count(), 1);
}

#[tokio::test]
async fn test_deepening_keeps_primary_when_candidate_is_worse() {
    let ctx = ctx_with_moves("e2e4 d7d5 b1c3 e7e5");
    let config = test_config();

    let probe = MockProbe::default();
    let mut backend = MockBackend::new(probe.clone());
    backend.depth = Some(5);
    backend.best = Some("e4d5".to_string());
    backend.deeper = Some(("c3d5".to_string(), Score::Cp(10)));

    let mut scheduler = scheduler(backend, &config);
    let decision = scheduler.request_move(&ctx).await.unwrap();

    assert_eq!(decision.uci, "e4d5");
    assert_eq!(probe.analysis_count(), 1);
}

#[tokio::test]
async fn test_no_deepening_when_primary_is_deep_enough() {
    let ctx = ctx_with_moves("e2e4 d7d5 b1c3 e7e5");
    let config = test_config();

    let probe = MockProbe::default();
    let mut backend = MockBackend::new(probe.clone());
    backend.depth = Some(20);
    backend.best = Some("e4d5".to_string());

    let mut scheduler = scheduler(backend, &config);
    let decision = scheduler.request_move(&ctx).await.unwrap();

    assert_eq!(decision.uci, "e4d5");
    assert_eq!(probe.analysis_count(), 0);
}

#[tokio::test]
async fn test_missing_primary_depth_counts_as_shallow() {
    // bestmove arrived without any info line: treat it like a depth-0 result
    let ctx = ctx_with_moves("e2e4 d7d5 b1c3 e7e5");
    let config = test_config();

    let probe = MockProbe::default();
    let mut backend = MockBackend::new(probe.clone());
    backend.depth = None;
    backend.best = Some("e4d5".to_string());
    backend.deeper = Some(("c3d5".to_string(), Score::Cp(80)));

    let mut scheduler = scheduler(backend, &config);
    let decision = scheduler.request_move(&ctx).await.unwrap();

    assert_eq!(probe.analysis_count(), 1);
    assert_eq!(decision.uci, "c3d5");
}

#[tokio::test]
async fn test_auto_tune_sets_each_unconfigured_knob_independently() {
    let mut config = test_config();
    config.auto_tune = true;
    config.uci_options = vec![("Threads".to_string(), "2".to_string())];

    let probe = MockProbe::default();
    let backend = MockBackend::new(probe.clone());
    let mut scheduler = scheduler(backend, &config);

    let host = SystemResources {
        cpu_count: 8,
        total_ram_mb: Some(16384),
    };
    scheduler.configure(&host).await;

    let set = probe.options_set();
    // Hash is still tuned even though Threads was pinned by the user
    assert!(set.contains(&("Hash".to_string(), "4096".to_string())));
    assert!(set.contains(&("Threads".to_string(), "2".to_string())));
    assert!(!set.contains(&("Threads".to_string(), "7".to_string())));
}

#[tokio::test]
async fn test_rejected_options_do_not_abort_configuration() {
    let mut config = test_config();
    config.auto_tune = true;
    config.uci_options = vec![("Contempt".to_string(), "30".to_string())];

    let probe = MockProbe::default();
    let mut backend = MockBackend::new(probe.clone());
    backend.reject_options = true;

    let mut scheduler = scheduler(backend, &config);
    scheduler.configure(&SystemResources {
        cpu_count: 4,
        total_ram_mb: Some(8192),
    })
    .await;

    // every setoption failed, yet the engine is still usable
    let ctx = ctx_with_moves("");
    let decision = scheduler.request_move(&ctx).await.unwrap();
    assert!(!decision.uci.is_empty());
    assert!(probe.options_set().is_empty());
}

#[tokio::test]
async fn test_resigns_after_a_sustained_lost_evaluation() {
    let ctx = ctx_with_moves("");
    let mut config = test_config();
    config.resign.enabled = true;
    config.resign.score_cp = -1000;

    let probe = MockProbe::default();
    let mut backend = MockBackend::new(probe);
    backend.score = -1500;

    let mut scheduler = scheduler(backend, &config);
    for _ in 0..2 {
        let decision = scheduler.request_move(&ctx).await.unwrap();
        assert!(!decision.resign);
    }
    let decision = scheduler.request_move(&ctx).await.unwrap();
    assert!(decision.resign);
}

#[tokio::test]
async fn test_offers_draw_after_a_sustained_level_evaluation() {
    let ctx = ctx_with_moves("");
    let mut config = test_config();
    config.draw.enabled = true;
    config.draw.min_fullmoves = 1;
    config.draw.max_abs_cp = 10;

    let probe = MockProbe::default();
    let mut backend = MockBackend::new(probe);
    backend.score = 5;

    let mut scheduler = scheduler(backend, &config);
    for _ in 0..4 {
        let decision = scheduler.request_move(&ctx).await.unwrap();
        assert!(!decision.offer_draw);
    }
    let decision = scheduler.request_move(&ctx).await.unwrap();
    assert!(decision.offer_draw);
}

#[tokio::test]
async fn test_compute_move_is_idempotent_for_an_unchanged_board() {
    let config = test_config();
    let probe = MockProbe::default();
    let backend = MockBackend::new(probe.clone());

    let shared = Shared::new(ctx_with_moves(""), scheduler(backend, &config));

    let first = compute_move(&shared).await.unwrap();
    let second = compute_move(&shared).await.unwrap();
    assert_eq!(first.uci, second.uci);
    assert_eq!(probe.search_count(), 1);

    // the board moved on: a fresh search is required
    shared
        .ctx
        .lock()
        .await
        .update(&game_state("e2e4 e7e5"))
        .unwrap();
    compute_move(&shared).await.unwrap();
    assert_eq!(probe.search_count(), 2);
}
