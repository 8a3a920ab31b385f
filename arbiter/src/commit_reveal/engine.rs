use super::{
    ingress::Message,
    metrics,
    ops::{generate_secret, Group},
    state::State,
    types::{self, Candidate, Error, Payload, Selection, Snapshot},
    Config, Mailbox,
};
use crate::Reporter;
use commonware_cryptography::{Digest, PublicKey};
use commonware_macros::select;
use commonware_p2p::{
    utils::codec::{wrap, WrappedSender},
    Receiver, Recipients, Sender,
};
use commonware_runtime::{
    telemetry::metrics::status::{CounterExt, Status},
    Handle, Metrics, Spawner,
};
use futures::{channel::mpsc, StreamExt};
use num_bigint::BigUint;
use rand::{CryptoRng, Rng};
use tracing::{debug, error, info, trace, warn};

/// Instance of the main engine for the module.
///
/// It is responsible for:
/// - Broadcasting the local roster, commitment, reveal, and confirmation
/// - Receiving the same from every other party and advancing the rounds
/// - Restarting the exchange when verification or confirmation disagrees
/// - Reporting the confirmed arbiter
pub struct Engine<
    E: Spawner + Rng + CryptoRng + Metrics,
    P: PublicKey,
    D: Digest,
    Z: Reporter<Activity = Selection<P>>,
> {
    ////////////////////////////////////////
    // Interfaces
    ////////////////////////////////////////
    context: E,

    /// Sink for the completed selection
    reporter: Z,

    ////////////////////////////////////////
    // Configuration
    ////////////////////////////////////////
    /// Digest of the contract this exchange runs for
    contract: D,

    /// All parties to the contract, in the order shared by every party
    signers: Vec<P>,

    /// Index of the local signer within `signers`
    me: u32,

    /// Every party other than the local signer
    others: Vec<P>,

    /// The group the exchange's arithmetic happens in
    group: Group,

    /// Bit length of freshly generated secrets
    secret_bits: u64,

    /// Number of restarts tolerated before the exchange fails
    max_restarts: u32,

    /// Whether messages are sent as priority
    priority: bool,

    /// Maximum number of candidates accepted in a single roster
    max_candidates: usize,

    ////////////////////////////////////////
    // State
    ////////////////////////////////////////
    /// Progress of the current attempt
    state: State<P>,

    /// Number of restarts performed so far
    restarts: u32,

    ////////////////////////////////////////
    // Messaging
    ////////////////////////////////////////
    /// The mailbox for receiving messages from the driver
    mailbox_receiver: mpsc::Receiver<Message<P>>,

    ////////////////////////////////////////
    // Metrics
    ////////////////////////////////////////
    /// Metrics
    metrics: metrics::Metrics,
}

impl<
        E: Spawner + Rng + CryptoRng + Metrics,
        P: PublicKey,
        D: Digest,
        Z: Reporter<Activity = Selection<P>>,
    > Engine<E, P, D, Z>
{
    /// Creates a new engine with the given context and configuration.
    /// Returns the engine and a mailbox for sending messages to the engine.
    ///
    /// Contract signers are removed from the configured candidate pool: the
    /// arbiter must be a disinterested party. Fails if the local key is not
    /// among the signers or if the contract has fewer than two parties.
    pub fn new(context: E, cfg: Config<P, D, Z>) -> Result<(Self, Mailbox<P>), Error> {
        let candidates = cfg
            .candidates
            .iter()
            .filter(|candidate| !cfg.signers.contains(&candidate.public_key))
            .cloned()
            .collect();
        let state = State::new(candidates, cfg.signers.len() as u32);
        Self::init(context, cfg, state)
    }

    /// Recreates an engine around previously captured progress.
    ///
    /// The candidate pool inside `snapshot` supersedes [Config::candidates],
    /// and the local commitment is re-derived from the persisted secret. The
    /// engine waits for traffic rather than replaying past broadcasts; after
    /// starting it on a fresh channel, the driver should call
    /// [Mailbox::start] again so parties that missed the original roster can
    /// catch up. Restoring a completed exchange yields an engine whose run
    /// resolves immediately without reporting a second time.
    pub fn restore(
        context: E,
        cfg: Config<P, D, Z>,
        snapshot: Snapshot<P>,
    ) -> Result<(Self, Mailbox<P>), Error> {
        let mut state = State::restore(snapshot, cfg.signers.len() as u32);
        let group = Group::standard();
        state.commitment = state.secret.as_ref().map(|secret| group.commit(secret));
        Self::init(context, cfg, state)
    }

    fn init(context: E, cfg: Config<P, D, Z>, state: State<P>) -> Result<(Self, Mailbox<P>), Error> {
        if cfg.signers.len() < 2 {
            return Err(Error::TooFewSigners(cfg.signers.len()));
        }
        let me = cfg
            .signers
            .iter()
            .position(|signer| *signer == cfg.public_key)
            .ok_or_else(|| Error::UnknownSigner(cfg.public_key.to_string()))?
            as u32;
        let others = cfg
            .signers
            .iter()
            .filter(|signer| **signer != cfg.public_key)
            .cloned()
            .collect();

        let (mailbox_sender, mailbox_receiver) = mpsc::channel(cfg.mailbox_size);
        let mailbox = Mailbox::new(mailbox_sender);
        let metrics = metrics::Metrics::init(context.clone());
        metrics.round.set(state.round() as i64);

        let result = Self {
            context,
            reporter: cfg.reporter,
            contract: cfg.contract,
            signers: cfg.signers,
            me,
            others,
            group: Group::standard(),
            secret_bits: cfg.secret_bits,
            max_restarts: cfg.max_restarts,
            priority: cfg.priority,
            max_candidates: cfg.max_candidates,
            state,
            restarts: 0,
            mailbox_receiver,
            metrics,
        };

        Ok((result, mailbox))
    }

    /// Starts the engine with the given network.
    ///
    /// The returned handle resolves once the exchange completes (`Ok`) or
    /// fails terminally; recoverable mismatches are absorbed by restarts and
    /// never surface here.
    pub fn start(
        mut self,
        network: (impl Sender<PublicKey = P>, impl Receiver<PublicKey = P>),
    ) -> Handle<Result<(), Error>> {
        self.context.spawn_ref()(self.run(network))
    }

    /// Inner run loop called by `start`.
    async fn run(
        mut self,
        network: (impl Sender<PublicKey = P>, impl Receiver<PublicKey = P>),
    ) -> Result<(), Error> {
        let (mut sender, mut receiver) = wrap(self.max_candidates, network.0, network.1);
        let mut shutdown = self.context.stopped();

        loop {
            // Once every round has completed there is nothing left to do;
            // the selection was already reported when the last round sealed.
            if self.state.complete() {
                return Ok(());
            }

            select! {
                // Handle shutdown signal
                _ = &mut shutdown => {
                    debug!("shutdown");
                    return Ok(());
                },

                // Handle mailbox messages
                mail = self.mailbox_receiver.next() => {
                    let Some(msg) = mail else {
                        error!("mailbox receiver failed");
                        return Ok(());
                    };
                    match msg {
                        Message::Start => {
                            trace!("mailbox: start");
                            self.broadcast_roster(&mut sender).await;
                            self.advance(&mut sender).await?;
                        }
                        Message::Snapshot { responder } => {
                            trace!("mailbox: snapshot");
                            let _ = responder.send(self.state.snapshot());
                        }
                    }
                },

                // Handle incoming messages
                msg = receiver.recv() => {
                    // Error handling
                    let (peer, msg) = match msg {
                        Ok(r) => r,
                        Err(err) => {
                            error!(?err, "receiver failed");
                            return Ok(());
                        }
                    };

                    // Decode the message
                    let msg = match msg {
                        Ok(msg) => msg,
                        Err(err) => {
                            warn!(?err, ?peer, "failed to decode message");
                            self.metrics.receive.inc(Status::Invalid);
                            continue;
                        }
                    };

                    self.handle_network(&mut sender, peer, msg).await?;
                },
            }
        }
    }

    ////////////////////////////////////////
    // Handling
    ////////////////////////////////////////

    /// Handles a message received from a peer.
    async fn handle_network<S: Sender<PublicKey = P>>(
        &mut self,
        sender: &mut WrappedSender<S, types::Message<P, D>>,
        peer: P,
        msg: types::Message<P, D>,
    ) -> Result<(), Error> {
        // Only messages for our contract are processed
        if msg.contract != self.contract {
            trace!(?peer, "dropped message for foreign contract");
            self.metrics.receive.inc(Status::Dropped);
            return Ok(());
        }

        // A message from outside the signer set poisons the exchange
        let Some(index) = self.signers.iter().position(|signer| *signer == peer) else {
            warn!(?peer, "message from unknown sender");
            self.metrics.receive.inc(Status::Failure);
            return Err(Error::UnknownSender(peer.to_string()));
        };
        let index = index as u32;

        // Contributions for rounds that already completed are stale
        let round = msg.payload.round();
        if !self.state.open(round) {
            trace!(?peer, round, "dropped message for completed round");
            self.metrics.receive.inc(Status::Dropped);
            return Ok(());
        }

        match msg.payload {
            Payload::Roster(candidates) => self.handle_roster(index, candidates),
            Payload::Commitment(commitment) => self.handle_commitment(index, commitment),
            Payload::Reveal(reveal) => self.handle_reveal(index, reveal),
            Payload::Confirm(public_key) => {
                self.handle_confirm(sender, index, public_key).await?
            }
        }
        self.metrics.receive.inc(Status::Success);

        self.advance(sender).await
    }

    /// Applies a peer's roster to the local candidate pool.
    fn handle_roster(&mut self, index: u32, candidates: Vec<Candidate<P>>) {
        // A peer's roster may arrive before the local trigger fires
        self.ensure_secret();
        self.state.intersect(&candidates);
        self.state.ack(0, index);
    }

    /// Records a peer's commitment.
    fn handle_commitment(&mut self, index: u32, commitment: BigUint) {
        if self.state.acked(1, index) {
            return;
        }
        self.state.peer_commitment = Some(commitment);
        self.state.ack(1, index);
    }

    /// Records a peer's revealed secret.
    fn handle_reveal(&mut self, index: u32, reveal: BigUint) {
        if self.state.acked(2, index) {
            return;
        }
        self.state.peer_reveal = Some(reveal);
        self.state.ack(2, index);
    }

    /// Compares a peer's confirmation against the locally selected candidate.
    async fn handle_confirm<S: Sender<PublicKey = P>>(
        &mut self,
        sender: &mut WrappedSender<S, types::Message<P, D>>,
        index: u32,
        public_key: P,
    ) -> Result<(), Error> {
        match &self.state.trusted {
            None => {
                self.state.trusted = Some(public_key);
                self.state.ack(3, index);
                Ok(())
            }
            Some(trusted) if *trusted == public_key => {
                self.state.ack(3, index);
                Ok(())
            }
            Some(_) => self.restart(sender, "confirmation mismatch").await,
        }
    }

    ////////////////////////////////////////
    // Round transitions
    ////////////////////////////////////////

    /// Runs the exit action of every round whose contributions are complete.
    ///
    /// Called after every state mutation so a round can seal regardless of
    /// which message (or the local trigger) supplied the last contribution.
    async fn advance<S: Sender<PublicKey = P>>(
        &mut self,
        sender: &mut WrappedSender<S, types::Message<P, D>>,
    ) -> Result<(), Error> {
        loop {
            if self.state.sealable(0) {
                self.finish_list_exchange(sender).await;
            } else if self.state.sealable(1) {
                self.finish_commitment_exchange(sender).await;
            } else if self.state.sealable(2) {
                self.finish_reveal_exchange(sender).await?;
            } else if self.state.sealable(3) {
                self.finish_confirmation().await;
            } else {
                return Ok(());
            }
        }
    }

    /// Seals round 0 and broadcasts the local commitment.
    async fn finish_list_exchange<S: Sender<PublicKey = P>>(
        &mut self,
        sender: &mut WrappedSender<S, types::Message<P, D>>,
    ) {
        self.state.seal(0);
        self.metrics.round.set(1);
        debug!(
            candidates = self.state.candidates.len(),
            "list exchange complete"
        );

        // The row can only fill after the local roster broadcast, which
        // derived the commitment.
        let commitment = self
            .state
            .commitment
            .clone()
            .expect("commitment derived before list exchange completes");
        self.broadcast(sender, Payload::Commitment(commitment)).await;
        self.state.ack(1, self.me);
    }

    /// Seals round 1, derives the shared value, and broadcasts the reveal.
    async fn finish_commitment_exchange<S: Sender<PublicKey = P>>(
        &mut self,
        sender: &mut WrappedSender<S, types::Message<P, D>>,
    ) {
        self.state.seal(1);
        self.metrics.round.set(2);
        debug!("commitment exchange complete");

        // A restored exchange may have lost the recorded commitment; the
        // verification check after the reveals will force a restart.
        if let (Some(peer_commitment), Some(secret)) =
            (&self.state.peer_commitment, &self.state.secret)
        {
            self.state.combined_commit = Some(self.group.combine(peer_commitment, secret));
        }

        let reveal = self
            .state
            .secret
            .clone()
            .expect("secret generated before commitment exchange completes");
        self.broadcast(sender, Payload::Reveal(reveal)).await;
        self.state.ack(2, self.me);
    }

    /// Seals round 2, verifies the exchange, and broadcasts the selection.
    async fn finish_reveal_exchange<S: Sender<PublicKey = P>>(
        &mut self,
        sender: &mut WrappedSender<S, types::Message<P, D>>,
    ) -> Result<(), Error> {
        self.state.seal(2);
        self.metrics.round.set(3);

        // Fold the last recorded reveal into the derived values
        if let (Some(commitment), Some(reveal)) = (&self.state.commitment, &self.state.peer_reveal)
        {
            self.state.combined_reveal = Some(self.group.combine(commitment, reveal));
        }
        if let (Some(secret), Some(reveal)) = (&self.state.secret, &self.state.peer_reveal) {
            self.state.final_number = Some(secret + reveal);
        }

        // Both sides must have derived the same shared value
        let verified = match (&self.state.combined_commit, &self.state.combined_reveal) {
            (Some(commit), Some(reveal)) => commit == reveal,
            _ => false,
        };
        if !verified {
            return self.restart(sender, "verification mismatch").await;
        }

        let Some(chosen) = self.state.choose() else {
            warn!("no candidate available");
            return Err(Error::NoCandidateAvailable);
        };
        debug!(candidate = ?chosen.public_key, "reveal exchange complete");
        if self.state.trusted.is_none() {
            self.state.trusted = Some(chosen.public_key.clone());
        }

        // Broadcast before checking agreement with any confirmation that
        // arrived early, so peers always see our selection.
        self.broadcast(sender, Payload::Confirm(chosen.public_key.clone()))
            .await;
        self.state.ack(3, self.me);
        if self.state.trusted.as_ref() != Some(&chosen.public_key) {
            return self.restart(sender, "confirmation mismatch").await;
        }
        Ok(())
    }

    /// Seals round 3 and reports the confirmed arbiter.
    async fn finish_confirmation(&mut self) {
        self.state.seal(3);
        self.metrics.round.set(4);

        let arbiter = self
            .state
            .trusted
            .clone()
            .expect("trusted party adopted before confirmation completes");
        info!(?arbiter, restarts = self.restarts, "selected arbiter");
        self.reporter
            .report(Selection {
                arbiter,
                restarts: self.restarts,
            })
            .await;
    }

    ////////////////////////////////////////
    // Broadcasts
    ////////////////////////////////////////

    /// Generates the local secret and its derived values, once per attempt.
    ///
    /// Both the local trigger and the first received roster call this, so
    /// whichever happens first initializes the attempt.
    fn ensure_secret(&mut self) {
        if self.state.secret.is_some() {
            return;
        }
        let secret = generate_secret(&mut self.context, self.secret_bits);
        self.state.final_number = Some(secret.clone());
        self.state.commitment = Some(self.group.commit(&secret));
        self.state.secret = Some(secret);
    }

    /// Broadcasts the local candidate pool and records the local round-0
    /// contribution.
    async fn broadcast_roster<S: Sender<PublicKey = P>>(
        &mut self,
        sender: &mut WrappedSender<S, types::Message<P, D>>,
    ) {
        self.ensure_secret();
        let roster = self.state.candidates.clone();
        debug!(candidates = roster.len(), "broadcasting roster");
        self.broadcast(sender, Payload::Roster(roster)).await;
        self.state.ack(0, self.me);
    }

    /// Sends a payload to every other party.
    async fn broadcast<S: Sender<PublicKey = P>>(
        &mut self,
        sender: &mut WrappedSender<S, types::Message<P, D>>,
        payload: Payload<P>,
    ) {
        let msg = types::Message {
            contract: self.contract,
            payload,
        };
        if let Err(err) = sender
            .send(Recipients::Some(self.others.clone()), msg, self.priority)
            .await
        {
            error!(?err, "failed to send message");
        }
    }

    /// Discards the current attempt and re-announces the roster.
    ///
    /// The candidate pool survives; everything else (including the secret,
    /// which is never reused) is drawn fresh by the re-announcement.
    async fn restart<S: Sender<PublicKey = P>>(
        &mut self,
        sender: &mut WrappedSender<S, types::Message<P, D>>,
        reason: &'static str,
    ) -> Result<(), Error> {
        if self.restarts >= self.max_restarts {
            return Err(Error::RestartLimitExceeded(self.restarts));
        }
        self.restarts += 1;
        self.metrics.restarts.inc();
        warn!(reason, restarts = self.restarts, "restarting exchange");

        self.state.reset();
        self.metrics.round.set(0);
        self.broadcast_roster(sender).await;
        Ok(())
    }
}
