//! Cooperative cancellation shared by every pipeline stage.
//!
//! A [`CancelToken`] pairs an atomic flag, checked before each line, with a
//! watch channel whose only sender is dropped on cancellation. Blocking queue
//! operations select on that watch channel as well, so a stage parked on a
//! full or empty queue wakes up as soon as the run is cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;

enum Never {}

#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<Never>>>,
    watch: Receiver<Never>,
}

/// Outcome of handing an item to a downstream queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Cancelled,
    /// Every receiver is gone.
    Closed,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, watch) = bounded(0);
        CancelToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                watch,
            }),
        }
    }

    /// Idempotent. Wakes every stage blocked in [`CancelToken::send`] or
    /// [`CancelToken::recv`].
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.trigger.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Blocks until `item` is accepted, the run is cancelled or the queue closes.
    pub fn send<T>(&self, tx: &Sender<T>, item: T) -> Delivery {
        if self.is_cancelled() {
            return Delivery::Cancelled;
        }
        select! {
            send(tx, item) -> res => match res {
                Ok(()) => Delivery::Sent,
                Err(_) => Delivery::Closed,
            },
            recv(self.inner.watch) -> _ => Delivery::Cancelled,
        }
    }

    /// Blocks until an item arrives. `None` once the queue is closed and
    /// drained, or the run is cancelled.
    pub fn recv<T>(&self, rx: &Receiver<T>) -> Option<T> {
        if self.is_cancelled() {
            return None;
        }
        select! {
            recv(rx) -> msg => msg.ok(),
            recv(self.inner.watch) -> _ => None,
        }
    }
}

/// Cancels `token` on SIGINT or SIGTERM.
#[cfg(unix)]
pub fn cancel_on_signals(token: &CancelToken) -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let token = token.clone();
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                tracing::warn!(signal, "received signal, cancelling run");
                token.cancel();
            }
        })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn cancel_on_signals(token: &CancelToken) -> std::io::Result<()> {
    let token = token.clone();
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))?;
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            token.cancel();
        })?;
    Ok(())
}
