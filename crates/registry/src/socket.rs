//! Per-session requester socket handle.

use {
    petrel_protocol::EventEnvelope, tokio::sync::mpsc, tokio_util::sync::CancellationToken,
};

/// Cloneable handle to one app session's outbound side: a queue feeding the
/// session's write loop plus the close signal.
///
/// Per-handler delivery order is the queue order; concurrent senders never
/// block. Ownership of the underlying transport transfers to the responder
/// handler at admission; every rejection path disposes the handle instead.
#[derive(Debug, Clone)]
pub struct RequesterSocket {
    sender: mpsc::UnboundedSender<EventEnvelope>,
    closed: CancellationToken,
}

impl RequesterSocket {
    /// New socket plus the receiving end the transport's write loop drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                closed: CancellationToken::new(),
            },
            receiver,
        )
    }

    /// Queue an envelope for this session. Fire-and-forget: returns false
    /// when the session is closed or its write loop is gone.
    pub fn send(&self, envelope: EventEnvelope) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.sender.send(envelope).is_ok()
    }

    /// Tear the session down. Idempotent; the write loop and disposal hooks
    /// all observe the same signal.
    pub fn dispose(&self) {
        self.closed.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session has been disposed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}
