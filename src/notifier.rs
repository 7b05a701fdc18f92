//! Notifier collaborator seam
//!
//! The engine produces [`GameEvent`]s; whatever transport the caller uses
//! (chat message edits in the original deployment) consumes them. The
//! engine never waits on delivery.

use crate::types::GameEvent;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: GameEvent);
}

/// Forwards events into an unbounded channel for an external renderer.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<GameEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GameEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: GameEvent) {
        // Receiver gone means nobody is rendering; drop the event.
        let _ = self.tx.send(event);
    }
}

/// Logs events instead of delivering them anywhere.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: GameEvent) {
        info!(?event, "Game event");
    }
}
