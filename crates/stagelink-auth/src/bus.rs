// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credentials-refreshed notification channel.
//!
//! Connections subscribe at connect time and drop their receiver at
//! disconnect time, keeping the subscription symmetric with the connection
//! lifetime. Notifications carry no payload; subscribers react by
//! force-reconnecting so the new connection picks up fresh credentials.

use tokio::sync::broadcast;

/// Broadcast bus announcing credential renewals to all subscribers.
#[derive(Debug, Clone)]
pub struct RefreshBus {
    tx: broadcast::Sender<()>,
}

impl RefreshBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Subscribe to refresh notifications.
    ///
    /// Dropping the receiver unsubscribes; a disconnected stream must not
    /// hold a live receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify all current subscribers that credentials were renewed.
    pub fn notify(&self) {
        // Send fails only when there are no subscribers, which is fine.
        let _ = self.tx.send(());
    }

    /// Number of live subscriptions (used by teardown tests).
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RefreshBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for the next refresh notification.
///
/// Resolves on a notification (lagged receivers count: missed notifications
/// still mean credentials changed). Pends forever once the bus is closed, so
/// this can sit in a `select!` without busy-looping.
pub async fn await_refresh(rx: &mut broadcast::Receiver<()>) {
    loop {
        match rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Discard any notifications already queued on `rx`.
///
/// A connection that was just (re)built with current credentials calls this
/// before listening again: notifications that raced the open refer to the
/// refresh it already benefited from and must not force another reconnect.
pub fn drain_refresh(rx: &mut broadcast::Receiver<()>) {
    use broadcast::error::TryRecvError;
    loop {
        match rx.try_recv() {
            Ok(()) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_reaches_all_subscribers() {
        let bus = RefreshBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.notify();

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn notify_without_subscribers_is_harmless() {
        let bus = RefreshBus::new();
        bus.notify();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropping_receiver_unsubscribes() {
        let bus = RefreshBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn drain_discards_queued_notifications_only() {
        let bus = RefreshBus::new();
        let mut rx = bus.subscribe();

        bus.notify();
        bus.notify();
        drain_refresh(&mut rx);
        assert!(rx.try_recv().is_err(), "queued notifications discarded");

        bus.notify();
        assert!(rx.try_recv().is_ok(), "later notifications still arrive");
    }
}
