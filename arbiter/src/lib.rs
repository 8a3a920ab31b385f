//! Select a mutually-trusted arbiter over a wide-area network.
//!
//! # Status
//!
//! `commonware-arbiter` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

use std::future::Future;

pub mod commit_reveal;

/// Reporter is the interface responsible for collecting the outcome of an exchange.
///
/// Selections are final: an engine reports at most once, after every party has
/// confirmed the same candidate. What happens next (recording the arbiter in the
/// contract, tearing down the channel) is up to the implementation.
pub trait Reporter: Clone + Send + 'static {
    /// The type of activity to report.
    type Activity: Send + 'static;

    /// Report some activity that has occurred.
    fn report(&mut self, activity: Self::Activity) -> impl Future<Output = ()> + Send;
}
