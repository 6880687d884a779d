//! Periodic liveness traffic.
//!
//! The heartbeat carries nothing. It exists so a link that has no scene
//! data to send still shows traffic; the receiving endpoint registers no
//! handler for it and the router drops it.

use std::time::Duration;

use bytes::Bytes;
use scenecast_protocol::command;
use scenecast_tick::Interval;

/// Emits the heartbeat message once per period while connected.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Interval,
    message: Bytes,
}

impl Heartbeat {
    pub fn new(period: Duration) -> Self {
        Self {
            interval: Interval::new(period),
            message: command::encode(command::HEARTBEAT, &[]),
        }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Advances by `dt`; returns the message to send when one is due.
    ///
    /// While disconnected nothing is sent and the period restarts, so the
    /// first heartbeat after a connect comes one full period later.
    pub fn tick(&mut self, dt: Duration, connected: bool) -> Option<Bytes> {
        if !connected {
            self.interval.reset();
            return None;
        }
        self.interval.advance(dt).then(|| self.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use scenecast_protocol::CommandFrame;

    use super::*;

    #[test]
    fn test_sends_every_period_while_connected() {
        let mut hb = Heartbeat::new(Duration::from_millis(100));
        let sent = (0..30)
            .filter(|_| hb.tick(Duration::from_millis(10), true).is_some())
            .count();
        assert_eq!(sent, 3);
    }

    #[test]
    fn test_silent_while_disconnected() {
        let mut hb = Heartbeat::new(Duration::from_millis(100));
        for _ in 0..50 {
            assert!(hb.tick(Duration::from_millis(10), false).is_none());
        }
    }

    #[test]
    fn test_disconnect_restarts_period() {
        let mut hb = Heartbeat::new(Duration::from_millis(100));
        assert!(hb.tick(Duration::from_millis(90), true).is_none());
        hb.tick(Duration::from_millis(10), false);
        assert!(hb.tick(Duration::from_millis(20), true).is_none());
    }

    #[test]
    fn test_message_is_heartbeat_with_empty_payload() {
        let mut hb = Heartbeat::new(Duration::ZERO);
        let msg = hb.tick(Duration::ZERO, true).unwrap();
        let frame = CommandFrame::parse(&msg).unwrap();
        assert_eq!(frame.command, command::HEARTBEAT);
        assert!(frame.payload.is_empty());
    }
}
