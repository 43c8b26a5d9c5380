use crate::dns::transport::Protocol;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapKind {
    ForwarderQuery,
    ForwarderResponse,
}

/// Copy of one message exchanged with an upstream.
#[derive(Debug, Clone)]
pub struct TapMessage {
    pub kind: TapKind,
    pub upstream: SocketAddr,
    pub protocol: Protocol,
    pub wire: Arc<[u8]>,
    pub timestamp: SystemTime,
}

impl TapMessage {
    pub fn new(kind: TapKind, upstream: SocketAddr, protocol: Protocol, wire: &[u8]) -> Self {
        Self {
            kind,
            upstream,
            protocol,
            wire: Arc::from(wire),
            timestamp: SystemTime::now(),
        }
    }
}

/// Fire-and-forget sink for [`TapMessage`]s; disabled unless a receiver was requested.
#[derive(Clone)]
pub struct QueryTapEmitter {
    sender: Option<mpsc::UnboundedSender<TapMessage>>,
}

impl QueryTapEmitter {
    pub fn new_disabled() -> Self {
        Self { sender: None }
    }

    pub fn new_enabled() -> (Self, mpsc::UnboundedReceiver<TapMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    /// Build and send a message; the copy is skipped entirely when disabled.
    pub fn emit(&self, kind: TapKind, upstream: SocketAddr, protocol: Protocol, wire: &[u8]) {
        if let Some(ref tx) = self.sender {
            let _ = tx.send(TapMessage::new(kind, upstream, protocol, wire));
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }
}

impl Default for QueryTapEmitter {
    fn default() -> Self {
        Self::new_disabled()
    }
}

impl std::fmt::Debug for QueryTapEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryTapEmitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_emitter_drops_silently() {
        let tap = QueryTapEmitter::default();
        assert!(!tap.is_enabled());
        tap.emit(
            TapKind::ForwarderQuery,
            "127.0.0.1:53".parse().unwrap(),
            Protocol::Udp,
            &[1, 2, 3],
        );
    }

    #[test]
    fn test_enabled_emitter_delivers() {
        let (tap, mut rx) = QueryTapEmitter::new_enabled();
        tap.emit(
            TapKind::ForwarderResponse,
            "127.0.0.1:53".parse().unwrap(),
            Protocol::Tcp,
            &[9, 9],
        );

        let message = rx.try_recv().unwrap();
        assert_eq!(message.kind, TapKind::ForwarderResponse);
        assert_eq!(message.protocol, Protocol::Tcp);
        assert_eq!(&*message.wire, &[9, 9]);
    }
}
