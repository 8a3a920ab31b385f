//! Progress tracking for one exchange attempt.

use super::types::{Candidate, Snapshot, Tally};
use commonware_cryptography::PublicKey;
use num_bigint::BigUint;
use num_traits::cast::ToPrimitive;
use std::{collections::BTreeSet, mem};

/// Number of rounds in one exchange attempt.
pub const ROUNDS: usize = 4;

/// Everything a single exchange attempt accumulates.
///
/// The candidate pool survives [State::reset]; all per-attempt scalars and
/// acknowledgments do not.
pub struct State<P: PublicKey> {
    /// Candidates still acceptable to every roster processed so far.
    pub candidates: Vec<Candidate<P>>,

    /// The local secret exponent.
    pub secret: Option<BigUint>,

    /// The local commitment (generator raised to the secret).
    pub commitment: Option<BigUint>,

    /// The most recently recorded peer commitment.
    pub peer_commitment: Option<BigUint>,

    /// The most recently recorded peer reveal.
    pub peer_reveal: Option<BigUint>,

    /// Peer commitment raised to the local secret.
    pub combined_commit: Option<BigUint>,

    /// Local commitment raised to the peer reveal.
    pub combined_reveal: Option<BigUint>,

    /// Sum of the local secret and recorded peer reveals.
    pub final_number: Option<BigUint>,

    /// The candidate this party has selected, once known.
    pub trusted: Option<P>,

    /// Per-round acknowledgment state.
    pub rows: [Tally; ROUNDS],

    /// Number of parties to the contract.
    signers: u32,
}

impl<P: PublicKey> State<P> {
    /// Creates a fresh state over an already-filtered candidate pool.
    pub fn new(candidates: Vec<Candidate<P>>, signers: u32) -> Self {
        Self {
            candidates,
            secret: None,
            commitment: None,
            peer_commitment: None,
            peer_reveal: None,
            combined_commit: None,
            combined_reveal: None,
            final_number: None,
            trusted: None,
            rows: Default::default(),
            signers,
        }
    }

    /// Rebuilds state from a [Snapshot].
    ///
    /// Scratch values absent from the snapshot (commitments, recorded peer
    /// scalars, the selected candidate) start empty; the exchange recovers
    /// them from subsequent traffic or by restarting.
    pub fn restore(snapshot: Snapshot<P>, signers: u32) -> Self {
        Self {
            candidates: snapshot.candidates,
            secret: snapshot.secret,
            commitment: None,
            peer_commitment: None,
            peer_reveal: None,
            combined_commit: None,
            combined_reveal: None,
            final_number: snapshot.final_number,
            trusted: None,
            rows: snapshot.rows,
            signers,
        }
    }

    /// Records that `index`'s contribution for `round` was processed.
    pub fn ack(&mut self, round: usize, index: u32) {
        self.rows[round].acked.insert(index);
    }

    /// Whether `index`'s contribution for `round` was already processed.
    pub fn acked(&self, round: usize, index: u32) -> bool {
        self.rows[round].acked.contains(&index)
    }

    /// Whether a round still accepts contributions.
    pub fn open(&self, round: usize) -> bool {
        !self.completed(round)
    }

    /// Whether a round is fully acknowledged and its exit action has run.
    pub fn completed(&self, round: usize) -> bool {
        let row = &self.rows[round];
        row.sealed && row.acked.len() == self.signers as usize
    }

    /// Whether a round is fully acknowledged but its exit action has not run.
    pub fn sealable(&self, round: usize) -> bool {
        let row = &self.rows[round];
        !row.sealed && row.acked.len() == self.signers as usize
    }

    /// Marks a round's exit action as run.
    pub fn seal(&mut self, round: usize) {
        self.rows[round].sealed = true;
    }

    /// The lowest round that has not completed (`ROUNDS` once all have).
    pub fn round(&self) -> usize {
        (0..ROUNDS).find(|round| !self.completed(*round)).unwrap_or(ROUNDS)
    }

    /// Whether every round has completed.
    pub fn complete(&self) -> bool {
        self.round() == ROUNDS
    }

    /// Retains only candidates also present in a peer's roster.
    ///
    /// Matching is by public key; local metadata is kept. Applying the same
    /// roster twice is a no-op, so replayed rosters are harmless.
    pub fn intersect(&mut self, peers: &[Candidate<P>]) {
        let keys: BTreeSet<&P> = peers.iter().map(|candidate| &candidate.public_key).collect();
        self.candidates = mem::take(&mut self.candidates)
            .into_iter()
            .filter(|candidate| keys.contains(&candidate.public_key))
            .collect();
    }

    /// Indexes the surviving candidates by the aggregated number.
    ///
    /// Candidates are ordered by public key so every party derives the same
    /// index regardless of the order rosters arrived in.
    pub fn choose(&self) -> Option<Candidate<P>> {
        let number = self.final_number.as_ref()?;
        if self.candidates.is_empty() {
            return None;
        }
        let mut pool = self.candidates.clone();
        pool.sort_by(|a, b| a.public_key.cmp(&b.public_key));
        let index = (number % pool.len()).to_usize().expect("residue fits in usize");
        Some(pool.swap_remove(index))
    }

    /// Discards all per-attempt progress, keeping the candidate pool.
    pub fn reset(&mut self) {
        self.secret = None;
        self.commitment = None;
        self.peer_commitment = None;
        self.peer_reveal = None;
        self.combined_commit = None;
        self.combined_reveal = None;
        self.final_number = None;
        self.trusted = None;
        self.rows = Default::default();
    }

    /// Captures the durable portion of this state.
    pub fn snapshot(&self) -> Snapshot<P> {
        Snapshot {
            candidates: self.candidates.clone(),
            secret: self.secret.clone(),
            final_number: self.final_number.clone(),
            rows: self.rows.clone(),
        }
    }
}
