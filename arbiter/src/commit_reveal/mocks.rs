//! Mock implementations for testing.

use super::types::Selection;
use crate::Reporter as Z;
use commonware_cryptography::PublicKey;
use futures::{channel::mpsc, SinkExt};

/// A [crate::Reporter] that forwards every selection to a channel.
#[derive(Clone)]
pub struct Reporter<P: PublicKey> {
    sender: mpsc::Sender<Selection<P>>,
}

impl<P: PublicKey> Reporter<P> {
    /// Create a reporter and the receiver observing everything it reports.
    pub fn new() -> (Self, mpsc::Receiver<Selection<P>>) {
        let (sender, receiver) = mpsc::channel(1024);
        (Self { sender }, receiver)
    }
}

impl<P: PublicKey> Z for Reporter<P> {
    type Activity = Selection<P>;

    async fn report(&mut self, activity: Self::Activity) {
        self.sender
            .send(activity)
            .await
            .expect("Failed to send selection");
    }
}
