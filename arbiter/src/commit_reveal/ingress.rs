use super::types::Snapshot;
use commonware_cryptography::PublicKey;
use futures::{
    channel::{mpsc, oneshot},
    SinkExt,
};

/// Message types that can be sent to the `Mailbox`
pub enum Message<P: PublicKey> {
    /// Announce the local roster to every other party.
    ///
    /// Sent once by the driver to begin the exchange, and again after a
    /// restore to prompt parties that missed the original announcement.
    Start,

    /// Request to capture the durable progress of the exchange.
    Snapshot {
        responder: oneshot::Sender<Snapshot<P>>,
    },
}

/// Ingress mailbox for [`Engine`](super::Engine).
#[derive(Clone)]
pub struct Mailbox<P: PublicKey> {
    sender: mpsc::Sender<Message<P>>,
}

impl<P: PublicKey> Mailbox<P> {
    pub(super) fn new(sender: mpsc::Sender<Message<P>>) -> Self {
        Self { sender }
    }

    /// Announce the local roster and begin participating.
    pub async fn start(&mut self) {
        self.sender
            .send(Message::Start)
            .await
            .expect("mailbox closed");
    }

    /// Capture the durable progress of the exchange.
    pub async fn snapshot(&mut self) -> oneshot::Receiver<Snapshot<P>> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(Message::Snapshot { responder: sender })
            .await
            .expect("mailbox closed");
        receiver
    }
}
