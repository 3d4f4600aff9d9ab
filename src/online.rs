//! Observable connectivity flag

use std::sync::Arc;
use tokio::sync::watch;

/// Shared online/offline flag.
///
/// The integrating application drives it from whatever connectivity signal
/// it has; the queue and detectors only ever read it or subscribe to
/// transitions.
#[derive(Clone)]
pub struct OnlineMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl OnlineMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self { state: Arc::new(state) }
    }

    pub fn set_online(&self, online: bool) {
        self.state.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for OnlineMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
