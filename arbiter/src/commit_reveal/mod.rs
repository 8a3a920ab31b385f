//! Select an arbiter by commitment, reveal, and cross-confirmation.
//!
//! # Overview
//!
//! Every party to a contract runs one [Engine]. Together the engines:
//! - Reconcile each party's candidate pool into a common pool (round 0)
//! - Exchange commitments to locally drawn secrets (round 1)
//! - Reveal the secrets and check them against the commitments (round 2)
//! - Confirm that every party selected the same candidate (round 3)
//!
//! The surviving candidates are ordered by public key and indexed by the sum
//! of the exchanged secrets, so no single party controls the outcome and
//! every honest party lands on the same arbiter. The confirmed selection is
//! handed to the configured [crate::Reporter].
//!
//! # Details
//!
//! A round advances only once every signer's contribution for it has been
//! recorded, including the local one. Contributions may arrive out of order
//! (a fast peer's reveal can land before a slow peer's roster) and are
//! absorbed as long as their round has not completed; contributions for
//! completed rounds are dropped. The driver triggers participation through
//! [Mailbox::start], which announces the local roster; everything after that
//! is message-driven.
//!
//! If the revealed secrets do not match the commitments, or parties confirm
//! different candidates, the exchange restarts: all per-attempt progress is
//! discarded (a fresh secret is drawn; the reconciled candidate pool is
//! kept) and the roster is re-announced. Restarts are bounded by
//! [Config::max_restarts], after which the engine fails with
//! [Error::RestartLimitExceeded].
//!
//! In-flight progress can be captured with [Mailbox::snapshot] and resumed
//! later with [Engine::restore], which re-derives the local commitment from
//! the persisted secret. A restored engine waits for traffic; calling
//! [Mailbox::start] again re-announces the roster so parties that missed the
//! original announcement can catch up.
//!
//! # Limitations
//!
//! Peer commitments and reveals are recorded in last-write-wins scratch
//! slots rather than per sender, and the aggregated number folds in only the
//! last recorded reveal. With two parties every contribution is used; with
//! more, whichever reveal arrives last at a party determines that party's
//! index, and parties observing different arrival orders restart until they
//! happen to agree. Contracts with more than two signers should treat this
//! dialect as experimental until the aggregation rule is finalized.

mod config;
pub use config::Config;
mod engine;
pub use engine::Engine;
mod ingress;
pub use ingress::Mailbox;
mod metrics;
mod ops;
mod state;
mod types;
pub use types::{Candidate, Error, Message, Payload, Selection, Snapshot, Tally};

#[cfg(test)]
pub mod mocks;
