use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::messages::{Event, SessionId};

/// Single-shot timer that reports [`Event::WatchdogFired`] if a processing
/// session does not finish in time. At most one is pending.
pub struct Watchdog {
    events: mpsc::Sender<Event>,
    /// Session the pending timer belongs to. Shared so observers can see it
    /// change in place.
    armed: Rc<Cell<Option<SessionId>>>,
    task: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn new(events: mpsc::Sender<Event>) -> Self {
        Self {
            events,
            armed: Rc::new(Cell::new(None)),
            task: None,
        }
    }

    /// Arm the watchdog for `session`, replacing any pending one.
    pub fn start(&mut self, session: SessionId, timeout: Duration) {
        self.cancel();

        tracing::debug!(session = %session, ?timeout, "Watchdog armed");
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if events.send(Event::WatchdogFired(session)).await.is_err() {
                tracing::debug!("Event loop closed before watchdog {} fired", session);
            }
        });

        self.armed.set(Some(session));
        self.task = Some(task);
    }

    /// Defuse the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(session) = self.armed.take() {
            tracing::debug!(session = %session, "Watchdog defused");
        }
    }

    /// Acknowledge a fire event. Returns false for a stale one, i.e. a
    /// timer that was already cancelled or replaced.
    pub fn fired(&mut self, session: SessionId) -> bool {
        if self.armed.get() != Some(session) {
            return false;
        }
        self.armed.set(None);
        self.task = None;
        true
    }

    #[cfg(test)]
    pub fn armed_for(&self) -> Option<SessionId> {
        self.armed.get()
    }

    #[cfg(test)]
    pub fn armed_cell(&self) -> Rc<Cell<Option<SessionId>>> {
        self.armed.clone()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
