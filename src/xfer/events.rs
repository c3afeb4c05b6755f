//! Transfer event system.
//!
//! Events are emitted by the transfer as it runs and can be received by
//! any number of subscribers. Workers are plain threads, so the
//! receiver blocks rather than awaits.

use std::fmt;
use tokio::sync::broadcast;

use super::TransferState;

/// Events emitted by a transfer during execution.
#[derive(Debug, Clone)]
pub enum XferEvent {
    /// Transfer state has changed.
    StateChanged {
        /// Previous state.
        from: TransferState,
        /// New state.
        to: TransferState,
    },

    /// An element's worker started.
    ElementStarted {
        /// The element that started.
        element: String,
    },

    /// An element's worker finished, cleanly or not.
    ElementFinished {
        /// The element that finished.
        element: String,
    },

    /// An error occurred in the transfer.
    Error {
        /// The element where the error occurred (if known).
        element: Option<String>,
        /// The error message.
        message: String,
    },

    /// The transfer was cancelled before completing.
    Cancelled,

    /// All workers finished and the stream completed.
    Done,
}

impl fmt::Display for XferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XferEvent::StateChanged { from, to } => {
                write!(f, "StateChanged: {from:?} -> {to:?}")
            }
            XferEvent::ElementStarted { element } => write!(f, "Element {element} started"),
            XferEvent::ElementFinished { element } => write!(f, "Element {element} finished"),
            XferEvent::Error { element, message } => {
                if let Some(e) = element {
                    write!(f, "Error in {e}: {message}")
                } else {
                    write!(f, "Error: {message}")
                }
            }
            XferEvent::Cancelled => write!(f, "Cancelled"),
            XferEvent::Done => write!(f, "Done"),
        }
    }
}

/// Sender for transfer events.
///
/// Held by the transfer and its workers.
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<XferEvent>,
}

impl EventSender {
    /// Create a new event sender with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event.
    ///
    /// Returns the number of receivers that got it; 0 when nobody is
    /// subscribed, which is fine.
    pub fn send(&self, event: XferEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Send a state changed event.
    pub fn send_state_changed(&self, from: TransferState, to: TransferState) {
        self.send(XferEvent::StateChanged { from, to });
    }

    /// Send an element started event.
    pub fn send_element_started(&self, element: impl Into<String>) {
        self.send(XferEvent::ElementStarted {
            element: element.into(),
        });
    }

    /// Send an element finished event.
    pub fn send_element_finished(&self, element: impl Into<String>) {
        self.send(XferEvent::ElementFinished {
            element: element.into(),
        });
    }

    /// Send an error event.
    pub fn send_error(&self, element: Option<String>, message: impl Into<String>) {
        self.send(XferEvent::Error {
            element,
            message: message.into(),
        });
    }

    /// Create a receiver for events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiver for transfer events.
///
/// Multiple receivers can be created from a single sender; each sees
/// every event sent after it subscribed.
pub struct EventReceiver {
    receiver: broadcast::Receiver<XferEvent>,
}

impl EventReceiver {
    /// Block until the next event.
    ///
    /// Returns `None` once every sender has been dropped. Skips past
    /// lagged gaps if this receiver fell behind.
    pub fn recv(&mut self) -> Option<XferEvent> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive an event without blocking.
    ///
    /// Returns `None` if no event is pending or the sender is gone.
    pub fn try_recv(&mut self) -> Option<XferEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_send_recv() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();

        sender.send(XferEvent::Done);

        let event = receiver.recv().unwrap();
        assert!(matches!(event, XferEvent::Done));
    }

    #[test]
    fn test_multiple_receivers_see_the_same_event() {
        let sender = EventSender::new(16);
        let mut receiver1 = sender.subscribe();
        let mut receiver2 = sender.subscribe();

        sender.send_state_changed(TransferState::NotStarted, TransferState::Started);

        assert!(matches!(
            receiver1.recv().unwrap(),
            XferEvent::StateChanged { .. }
        ));
        assert!(matches!(
            receiver2.recv().unwrap(),
            XferEvent::StateChanged { .. }
        ));
    }

    #[test]
    fn test_recv_none_after_sender_drop() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();
        drop(sender);
        assert!(receiver.recv().is_none());
    }

    #[test]
    fn test_event_display() {
        let event = XferEvent::Error {
            element: Some("sink".to_string()),
            message: "write failed".to_string(),
        };
        assert_eq!(format!("{event}"), "Error in sink: write failed");
    }
}
