use commonware_runtime::{telemetry::metrics::status, Metrics as RuntimeMetrics};
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

/// Metrics for the [super::Engine]
#[derive(Default)]
pub struct Metrics {
    /// Current round of the exchange (4 once complete)
    pub round: Gauge,
    /// Number of restarts performed
    pub restarts: Counter,
    /// Number of received messages by status
    pub receive: status::Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Self::default();
        context.register(
            "round",
            "Current round of the exchange",
            metrics.round.clone(),
        );
        context.register(
            "restarts",
            "Number of restarts performed",
            metrics.restarts.clone(),
        );
        context.register(
            "receive",
            "Number of received messages by status",
            metrics.receive.clone(),
        );
        metrics
    }
}
