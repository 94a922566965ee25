// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Named transaction timers.
//!
//! Each armed timer holds a `oneshot` cancellation token; a background task
//! races the token against the deadline and, if it wins, posts a
//! [`CallEvent::Timer`](crate::call::CallEvent) back to the owning call
//! actor. Re-arming a name
//! cancels the previous instance, cancellation is O(1) by name, and firings
//! that arrive after the transaction finished are dropped by the actor.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::trace;

use crate::app::CallbackKind;
use crate::call::CallEvent;
use crate::tx::TxId;

/// Timers owned by a UAS transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerName {
    /// Provisional re-send guard for INVITE on unreliable transports (T1).
    Prov100,
    /// INVITE guard timer (RFC 3261 timer C).
    TimerC,
    /// Non-INVITE transaction timeout (timer F).
    NonInvite,
    /// `Expires` header deadline on INVITE.
    Expire,
    /// Deadline for an asynchronous application callback.
    App(CallbackKind),
}

impl TimerName {
    /// Returns a stable label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            TimerName::Prov100 => "timer_100",
            TimerName::TimerC => "timer_c",
            TimerName::NonInvite => "noinvite",
            TimerName::Expire => "expire",
            TimerName::App(kind) => kind.as_str(),
        }
    }
}

/// Mapping from timer name to its cancellation token.
#[derive(Debug, Default)]
pub struct TimerTable {
    armed: HashMap<TimerName, oneshot::Sender<()>>,
}

impl TimerTable {
    /// Creates an empty timer table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the named timer, replacing any previous instance.
    ///
    /// When the deadline passes, `CallEvent::Timer { tx_id, name }` is posted
    /// to `events`; if the call actor is gone the firing is discarded.
    pub fn arm(
        &mut self,
        name: TimerName,
        after: Duration,
        tx_id: TxId,
        events: mpsc::Sender<CallEvent>,
    ) {
        self.cancel(name);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.armed.insert(name, cancel_tx);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_rx => {}
                _ = time::sleep(after) => {
                    trace!(tx_id = %tx_id, timer = name.label(), "timer fired");
                    let _ = events.send(CallEvent::Timer { tx_id, name }).await;
                }
            }
        });
    }

    /// Cancels the named timer. Returns `true` when it was armed.
    pub fn cancel(&mut self, name: TimerName) -> bool {
        match self.armed.remove(&name) {
            Some(cancel) => {
                let _ = cancel.send(());
                true
            }
            None => false,
        }
    }

    /// Cancels every armed timer.
    pub fn cancel_all(&mut self) {
        for (_, cancel) in self.armed.drain() {
            let _ = cancel.send(());
        }
    }

    /// Returns `true` when the named timer is currently armed.
    pub fn is_armed(&self, name: TimerName) -> bool {
        self.armed.contains_key(&name)
    }

    /// Number of armed timers.
    pub fn active(&self) -> usize {
        self.armed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_and_posts_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = TimerTable::new();
        timers.arm(TimerName::TimerC, Duration::from_secs(180), TxId(3), tx);

        time::advance(Duration::from_secs(181)).await;
        match rx.recv().await {
            Some(CallEvent::Timer { tx_id, name }) => {
                assert_eq!(tx_id, TxId(3));
                assert_eq!(name, TimerName::TimerC);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_firing() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = TimerTable::new();
        timers.arm(TimerName::NonInvite, Duration::from_secs(32), TxId(1), tx);
        assert!(timers.cancel(TimerName::NonInvite));
        assert!(!timers.cancel(TimerName::NonInvite));

        time::advance(Duration::from_secs(40)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_previous_deadline() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = TimerTable::new();
        timers.arm(
            TimerName::Expire,
            Duration::from_secs(5),
            TxId(1),
            tx.clone(),
        );
        timers.arm(TimerName::Expire, Duration::from_secs(60), TxId(1), tx);
        assert_eq!(timers.active(), 1);

        time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err(), "first deadline must not fire");

        time::advance(Duration::from_secs(55)).await;
        assert!(matches!(
            rx.recv().await,
            Some(CallEvent::Timer {
                name: TimerName::Expire,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_table() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = TimerTable::new();
        timers.arm(
            TimerName::TimerC,
            Duration::from_secs(180),
            TxId(1),
            tx.clone(),
        );
        timers.arm(TimerName::Prov100, Duration::from_millis(500), TxId(1), tx);
        assert_eq!(timers.active(), 2);

        timers.cancel_all();
        assert_eq!(timers.active(), 0);

        time::advance(Duration::from_secs(200)).await;
        assert!(rx.try_recv().is_err());
    }
}
