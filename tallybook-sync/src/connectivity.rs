//! Online/offline state with edge-triggered notifications.
//!
//! The platform pushes "went online" / "went offline" signals in; nothing
//! here probes the network. Each subscriber owns an unbounded channel, so a
//! subscriber that is slow, gone, or panicking never holds up the others.

use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        self == Connectivity::Online
    }
}

impl From<bool> for Connectivity {
    fn from(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => f.write_str("online"),
            Connectivity::Offline => f.write_str("offline"),
        }
    }
}

struct MonitorState {
    current: Connectivity,
    subscribers: Vec<mpsc::UnboundedSender<Connectivity>>,
}

/// Current connectivity plus the list of parties to tell when it changes.
///
/// Cloning yields another handle to the same monitor.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<Mutex<MonitorState>>,
    watch_tx: Arc<watch::Sender<Connectivity>>,
}

/// Receiving end of [`ConnectivityMonitor::subscribe`]. Yields each new state
/// once, in transition order.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Connectivity>,
}

impl Subscription {
    /// Waits for the next transition. `None` once the monitor is dropped.
    pub async fn recv(&mut self) -> Option<Connectivity> {
        self.rx.recv().await
    }

    /// Next already-delivered transition, if any.
    pub fn try_recv(&mut self) -> Option<Connectivity> {
        self.rx.try_recv().ok()
    }
}

impl ConnectivityMonitor {
    /// Creates a monitor seeded with the platform's current signal.
    pub fn new(initial: Connectivity) -> Self {
        let (watch_tx, _) = watch::channel(initial);
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                current: initial,
                subscribers: Vec::new(),
            })),
            watch_tx: Arc::new(watch_tx),
        }
    }

    /// Feeds a platform signal in. Returns `true` if it caused a transition;
    /// a signal matching the current state is ignored.
    pub fn signal(&self, next: Connectivity) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.current == next {
            debug!("ignoring repeated {next} signal");
            return false;
        }
        state.current = next;

        let before = state.subscribers.len();
        state.subscribers.retain(|tx| tx.send(next).is_ok());
        let dropped = before - state.subscribers.len();
        if dropped > 0 {
            debug!("pruned {dropped} closed connectivity subscribers");
        }
        self.watch_tx.send_replace(next);
        drop(state);

        info!("connectivity changed: {next}");
        true
    }

    pub fn went_online(&self) -> bool {
        self.signal(Connectivity::Online)
    }

    pub fn went_offline(&self) -> bool {
        self.signal(Connectivity::Offline)
    }

    pub fn current(&self) -> Connectivity {
        *self.watch_tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Observable `isOnline` state for UI bindings.
    pub fn watch(&self) -> watch::Receiver<Connectivity> {
        self.watch_tx.subscribe()
    }

    /// Registers a subscriber that receives every future transition.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.state.lock() {
            Ok(mut state) => state.subscribers.push(tx),
            Err(poisoned) => poisoned.into_inner().subscribers.push(tx),
        }
        Subscription { rx }
    }

    /// Runs `callback` on its own task for each transition. A panic inside
    /// the callback is logged and the callback stays registered.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_transition<F, Fut>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(Connectivity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut subscription = self.subscribe();
        tokio::spawn(async move {
            while let Some(state) = subscription.recv().await {
                let run = AssertUnwindSafe(async { callback(state).await });
                if run.catch_unwind().await.is_err() {
                    warn!("connectivity callback panicked on {state} transition");
                }
            }
        })
    }

    /// Number of live subscribers, after pruning closed ones.
    pub fn subscriber_count(&self) -> usize {
        match self.state.lock() {
            Ok(mut state) => {
                state.subscribers.retain(|tx| !tx.is_closed());
                state.subscribers.len()
            }
            Err(poisoned) => poisoned.into_inner().subscribers.len(),
        }
    }
}

impl fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("current", &self.current())
            .finish()
    }
}
