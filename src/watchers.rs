// src/watchers.rs
//! Focus-gated interval tasks
//!
//! Background pollers no-op while the app is not in foreground focus, to
//! avoid burning rate limits from background tabs. Bounded transaction
//! confirmation polls are the exception and do NOT live here - they keep
//! running regardless of focus because they are time-critical and bounded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::wallets::{NativeWallet, NetworkDescriptor};

/// Host-supplied foreground state. The rendering shell flips this on
/// visibility changes; pollers read it each tick.
#[derive(Clone)]
pub struct FocusFlag(Arc<AtomicBool>);

impl FocusFlag {
    /// Starts focused - a freshly mounted app is in the foreground.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn set_focused(&self, focused: bool) {
        self.0.store(focused, Ordering::Relaxed);
    }

    pub fn is_focused(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for FocusFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running poller. Dropping it (or calling `stop`) aborts the
/// task, so an interval can never outlive its owner.
pub struct PollerHandle {
    handle: JoinHandle<()>,
}

impl PollerHandle {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Polls the native wallet's reported network and publishes changes on a
/// watch channel so the shell can re-derive readiness.
pub struct NetworkWatcher {
    wallet: Arc<dyn NativeWallet>,
    focus: FocusFlag,
    interval: Duration,
    sender: watch::Sender<Option<NetworkDescriptor>>,
}

impl NetworkWatcher {
    pub fn new(wallet: Arc<dyn NativeWallet>, focus: FocusFlag, interval: Duration) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            wallet,
            focus,
            interval,
            sender,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<NetworkDescriptor>> {
        self.sender.subscribe()
    }

    pub fn start(self: Arc<Self>) -> PollerHandle {
        let watcher = self;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(watcher.interval);
            loop {
                ticker.tick().await;

                if !watcher.focus.is_focused() {
                    continue;
                }

                let network = watcher.wallet.network().await;
                watcher.sender.send_if_modified(|current| {
                    if *current != network {
                        debug!("Native network changed: {:?} -> {:?}", current, network);
                        *current = network.clone();
                        true
                    } else {
                        false
                    }
                });
            }
        });

        PollerHandle::new(handle)
    }
}
