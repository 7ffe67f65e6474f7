//! Outbound protocol actions.
//!
//! Dispatched fire-and-forget over an unbounded channel so that no
//! outbound call ever blocks consumption of the next incoming event.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum OutboundAction {
    #[serde(rename_all = "camelCase")]
    Move { uci: String, offer_draw: bool },
    Resign,
    Abort,
    ClaimVictory,
    AcceptDraw,
    DeclineDraw,
    AcceptTakeback,
    DeclineTakeback,
    OfferRematch,
}

pub type ActionTx = mpsc::UnboundedSender<OutboundAction>;

/// Fire-and-forget dispatch. A closed channel means the transport side is
/// gone; the action is dropped with a warning rather than failing the
/// session.
pub fn dispatch(tx: &ActionTx, action: OutboundAction) {
    if tx.send(action).is_err() {
        warn!("action channel closed, outbound action dropped");
    }
}
