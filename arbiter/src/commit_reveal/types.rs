//! Types used in [`commit_reveal`](crate::commit_reveal).

use bytes::{Buf, BufMut};
use commonware_codec::{
    EncodeSize, Error as CodecError, RangeCfg, Read, ReadExt, ReadRangeExt, Write,
};
use commonware_cryptography::{Digest, PublicKey};
use num_bigint::BigUint;
use std::collections::BTreeSet;
use thiserror::Error;

/// Maximum number of metadata bytes carried by a single candidate.
const MAX_METADATA: usize = 1_024;

/// Maximum number of bytes accepted for an exchanged scalar.
///
/// Twice the width of the modulus, leaving room for honest encodings while
/// bounding allocation on decode.
const MAX_SCALAR_BYTES: usize = 256;

/// Errors that can occur when selecting an arbiter.
#[derive(Error, Debug)]
pub enum Error {
    // Initialization errors
    /// The local signer is not a party to the contract.
    #[error("signer is not a party to the contract: {0}")]
    UnknownSigner(String),
    /// The contract does not have enough parties to run an exchange.
    #[error("too few signers: {0}")]
    TooFewSigners(usize),

    // Protocol errors
    /// A message arrived from a key that is not a party to the contract.
    #[error("sender is not a party to the contract: {0}")]
    UnknownSender(String),
    /// No candidate survived the list exchange.
    #[error("no candidate available")]
    NoCandidateAvailable,
    /// The exchange restarted more times than the configuration tolerates.
    #[error("restart limit exceeded after {0} restarts")]
    RestartLimitExceeded(u32),
}

/// A party eligible to be selected as the arbiter.
///
/// Identity (equality, intersection, selection order) is the public key alone;
/// the metadata is an opaque display payload carried for the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate<P: PublicKey> {
    /// The candidate's public key.
    pub public_key: P,

    /// Opaque metadata describing the candidate.
    pub metadata: Vec<u8>,
}

impl<P: PublicKey> Write for Candidate<P> {
    fn write(&self, writer: &mut impl BufMut) {
        self.public_key.write(writer);
        self.metadata.write(writer);
    }
}

impl<P: PublicKey> EncodeSize for Candidate<P> {
    fn encode_size(&self) -> usize {
        self.public_key.encode_size() + self.metadata.encode_size()
    }
}

impl<P: PublicKey> Read for Candidate<P> {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let public_key = P::read(reader)?;
        let metadata = Vec::<u8>::read_range(reader, ..=MAX_METADATA)?;
        Ok(Self {
            public_key,
            metadata,
        })
    }
}

/// The body of an exchange message.
///
/// The wire tag doubles as the round the payload belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload<P: PublicKey> {
    /// Round 0: the sender's current candidate list.
    Roster(Vec<Candidate<P>>),

    /// Round 1: the sender's public commitment to its secret.
    Commitment(BigUint),

    /// Round 2: the sender's revealed secret.
    Reveal(BigUint),

    /// Round 3: the public key of the candidate the sender selected.
    Confirm(P),
}

impl<P: PublicKey> Payload<P> {
    /// Returns the round this payload belongs to.
    pub fn round(&self) -> usize {
        match self {
            Payload::Roster(_) => 0,
            Payload::Commitment(_) => 1,
            Payload::Reveal(_) => 2,
            Payload::Confirm(_) => 3,
        }
    }
}

impl<P: PublicKey> Write for Payload<P> {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Payload::Roster(candidates) => {
                writer.put_u8(0);
                candidates.write(writer);
            }
            Payload::Commitment(commitment) => {
                writer.put_u8(1);
                write_biguint(commitment, writer);
            }
            Payload::Reveal(reveal) => {
                writer.put_u8(2);
                write_biguint(reveal, writer);
            }
            Payload::Confirm(public_key) => {
                writer.put_u8(3);
                public_key.write(writer);
            }
        }
    }
}

impl<P: PublicKey> EncodeSize for Payload<P> {
    fn encode_size(&self) -> usize {
        1 + match self {
            Payload::Roster(candidates) => candidates.encode_size(),
            Payload::Commitment(commitment) => biguint_size(commitment),
            Payload::Reveal(reveal) => biguint_size(reveal),
            Payload::Confirm(public_key) => public_key.encode_size(),
        }
    }
}

impl<P: PublicKey> Read for Payload<P> {
    type Cfg = usize;

    fn read_cfg(reader: &mut impl Buf, max_candidates: &usize) -> Result<Self, CodecError> {
        let tag = u8::read(reader)?;
        match tag {
            0 => {
                let candidates = Vec::<Candidate<P>>::read_range(reader, ..=*max_candidates)?;
                Ok(Payload::Roster(candidates))
            }
            1 => {
                let commitment = read_biguint(reader)?;
                Ok(Payload::Commitment(commitment))
            }
            2 => {
                let reveal = read_biguint(reader)?;
                Ok(Payload::Reveal(reveal))
            }
            3 => {
                let public_key = P::read(reader)?;
                Ok(Payload::Confirm(public_key))
            }
            _ => Err(CodecError::Invalid(
                "arbiter::commit_reveal::Payload",
                "Invalid type",
            )),
        }
    }
}

/// A message exchanged between the parties of one contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message<P: PublicKey, D: Digest> {
    /// The digest of the contract this exchange belongs to.
    ///
    /// Messages bearing a foreign digest are dropped without processing.
    pub contract: D,

    /// The body of the message.
    pub payload: Payload<P>,
}

impl<P: PublicKey, D: Digest> Write for Message<P, D> {
    fn write(&self, writer: &mut impl BufMut) {
        self.contract.write(writer);
        self.payload.write(writer);
    }
}

impl<P: PublicKey, D: Digest> EncodeSize for Message<P, D> {
    fn encode_size(&self) -> usize {
        self.contract.encode_size() + self.payload.encode_size()
    }
}

impl<P: PublicKey, D: Digest> Read for Message<P, D> {
    type Cfg = usize;

    fn read_cfg(reader: &mut impl Buf, max_candidates: &usize) -> Result<Self, CodecError> {
        let contract = D::read(reader)?;
        let payload = Payload::read_cfg(reader, max_candidates)?;
        Ok(Self { contract, payload })
    }
}

/// Outcome of a completed exchange, handed to the [crate::Reporter].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection<P: PublicKey> {
    /// The arbiter every party confirmed.
    pub arbiter: P,

    /// Number of restarts the exchange needed before completing.
    pub restarts: u32,
}

/// Acknowledgment record for one round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    /// Indices of the signers whose contribution for the round was recorded.
    pub acked: BTreeSet<u32>,

    /// Whether the round's exit action has run.
    pub sealed: bool,
}

/// Resumable progress of an exchange.
///
/// Produced by [super::Mailbox::snapshot] and consumed by
/// [super::Engine::restore]. The local identity and the signer set are not
/// part of the snapshot: the driver re-supplies them through the
/// configuration when restoring.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<P: PublicKey> {
    /// The candidate pool as of the last processed roster.
    pub candidates: Vec<Candidate<P>>,

    /// The local secret, if one was generated.
    pub secret: Option<BigUint>,

    /// The aggregated number used to index the candidate pool.
    pub final_number: Option<BigUint>,

    /// Acknowledgment state for each round.
    pub rows: [Tally; 4],
}

fn write_biguint(value: &BigUint, buf: &mut impl BufMut) {
    let bytes = value.to_bytes_be();
    bytes.len().write(buf);
    buf.put_slice(&bytes);
}

fn biguint_size(value: &BigUint) -> usize {
    let len = (value.bits() as usize).div_ceil(8).max(1);
    len.encode_size() + len
}

fn read_biguint(buf: &mut impl Buf) -> Result<BigUint, CodecError> {
    let len = usize::read_cfg(buf, &RangeCfg::from(1..=MAX_SCALAR_BYTES))?;
    if buf.remaining() < len {
        return Err(CodecError::EndOfBuffer);
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    if len > 1 && bytes[0] == 0 {
        return Err(CodecError::Invalid(
            "arbiter::commit_reveal::Payload",
            "scalar encoding is not minimal",
        ));
    }
    Ok(BigUint::from_bytes_be(&bytes))
}
