use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::Mutex;

/// Sends a one-shot stop signal to every listener created from it.
///
/// The process owns one of these for Ctrl-C handling, and every scheduled aggregation task owns its
/// own so that it can be stopped without touching any other task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
        }
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.sender.send(()) {
            // Nobody is listening any more, which means whatever we wanted to stop has already
            // stopped.
            log::debug!("No listeners for stop signal: {e:?}");
        }
    }

    /// Listeners only observe signals sent after they were created.
    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Arc<Mutex<Receiver<()>>>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<()>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Point in time check whether the stop signal has been received, or the handle that owns the
    /// signal has been dropped.
    pub fn should_shutdown(&mut self) -> bool {
        match self.receiver.try_lock() {
            Ok(mut guard) => match guard.try_recv() {
                Ok(_) => true,
                Err(TryRecvError::Closed) => true,
                Err(TryRecvError::Lagged(_)) => true,
                Err(TryRecvError::Empty) => false,
            },
            Err(_) => false,
        }
    }

    /// Wait for the stop signal. Safe to race against other futures in a `select!`, a signal sent
    /// while this future is not being polled stays buffered for the next call.
    pub async fn wait_for_shutdown(&mut self) {
        let mut receiver = self.receiver.lock().await;
        // Every outcome means stop: a signal, a lagged signal or a dropped handle.
        let _ = receiver.recv().await;
    }
}
