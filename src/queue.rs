//! The writer-to-worker wake-up signal.
//!
//! A capacity-1 `mpsc` channel. Writers call [`WakeSignal::notify`] after
//! appending a change; it never blocks and never queues more than one
//! pending wake-up — the worker only ever needs to know "there may be new
//! work", not how many times it was told so.

use tokio::sync::mpsc;

pub struct WakeSignal {
    tx: mpsc::Sender<()>,
}

pub struct WakeReceiver {
    rx: mpsc::Receiver<()>,
}

/// Build a linked sender/receiver pair with the given channel capacity
/// (ordinarily 1; see [`crate::config::Config::wake_channel_capacity`]).
pub fn channel(capacity: usize) -> (WakeSignal, WakeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (WakeSignal { tx }, WakeReceiver { rx })
}

impl WakeSignal {
    /// Signal that new work may be available. Non-blocking: if the channel
    /// is already full (a wake-up is still pending) or the receiver has
    /// been dropped, this is a silent no-op.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

impl WakeReceiver {
    /// Wait for a wake-up signal.
    pub async fn woken(&mut self) {
        let _ = self.rx.recv().await;
    }
}
