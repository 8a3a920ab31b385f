use super::types::{Candidate, Selection};
use crate::Reporter;
use commonware_cryptography::{Digest, PublicKey};

/// Configuration for the [Engine](super::Engine).
#[derive(Clone)]
pub struct Config<P: PublicKey, D: Digest, Z: Reporter<Activity = Selection<P>>> {
    /// The local signer's public key.
    pub public_key: P,

    /// Digest of the contract the exchange runs for.
    ///
    /// Messages bearing any other digest are dropped.
    pub contract: D,

    /// All parties to the contract.
    ///
    /// Every party must supply the same set in the same order.
    pub signers: Vec<P>,

    /// The candidates the local party is willing to trust.
    ///
    /// The arbiter must be a disinterested party, so entries whose public
    /// key belongs to a signer are discarded at construction.
    pub candidates: Vec<Candidate<P>>,

    /// Sink for the completed selection.
    pub reporter: Z,

    /// Bit length of freshly generated secrets.
    pub secret_bits: u64,

    /// Number of restarts tolerated before the exchange fails.
    pub max_restarts: u32,

    /// Number of messages from the driver to buffer.
    pub mailbox_size: usize,

    /// Whether to send messages with priority.
    pub priority: bool,

    /// Maximum number of candidates accepted in a single roster message.
    pub max_candidates: usize,
}
