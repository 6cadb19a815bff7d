//! Event channel from the engine to its caller.
//!
//! Unbounded and ordered. A dropped receiver turns emission into a no-op so
//! the engine never blocks on, or fails because of, the UI side.

use dr_shared::DrEvent;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: Option<UnboundedSender<DrEvent>>,
}

impl ChannelEmitter {
    /// Emitter that only logs
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: DrEvent) {
        debug!("{}", event.format_debug());
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Create an emitter and the receiver the caller drains
pub fn create_channel_emitter() -> (ChannelEmitter, UnboundedReceiver<DrEvent>) {
    let (tx, rx) = unbounded_channel();
    (ChannelEmitter { tx: Some(tx) }, rx)
}

/// Drain everything currently queued without waiting
pub fn drain_events(rx: &mut UnboundedReceiver<DrEvent>) -> Vec<DrEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let (emitter, mut rx) = create_channel_emitter();
        emitter.emit(DrEvent::Progress { percent: 10 });
        emitter.emit(DrEvent::Progress { percent: 20 });
        let events = drain_events(&mut rx);
        assert_eq!(
            events,
            vec![
                DrEvent::Progress { percent: 10 },
                DrEvent::Progress { percent: 20 }
            ]
        );
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (emitter, rx) = create_channel_emitter();
        drop(rx);
        emitter.emit(DrEvent::Progress { percent: 10 });
        ChannelEmitter::noop().emit(DrEvent::Progress { percent: 10 });
    }
}
