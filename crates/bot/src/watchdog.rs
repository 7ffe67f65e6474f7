//! Abortion watchdog.
//!
//! Armed once at session start; after the grace period it aborts the game
//! if the opponent still has not moved. Cancelled unconditionally when the
//! session finishes.

use std::sync::Arc;
use std::time::Duration;

use crate::actions::{dispatch, ActionTx, OutboundAction};
use crate::presenter::Presenter;
use crate::session::Shared;

pub(crate) async fn abortion_timer(
    grace: Duration,
    shared: Arc<Shared>,
    actions: ActionTx,
    presenter: Arc<dyn Presenter>,
) {
    tokio::time::sleep(grace).await;

    let abort = {
        let ctx = shared.ctx.lock().await;
        !ctx.is_our_turn() && ctx.is_abortable()
    };
    if abort {
        presenter.notice("Aborting game: the opponent has not made a move.");
        dispatch(&actions, OutboundAction::Abort);
    }
}
