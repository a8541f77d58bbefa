use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// A container for all Prometheus metric collectors for the fleet manager.
///
/// This struct is designed to be wrapped in an `Arc` and shared across all
/// concurrent tasks of the application.
pub struct Metrics {
    pub registry: Registry,
    /// Total number of robot state reports ingested by the poll loop.
    pub states_received_total: IntCounter,
    /// Total number of robots that have ever been registered.
    pub robots_registered_total: IntCounter,
    /// Total number of requests dispatched for the first time.
    pub requests_sent_total: IntCounter,
    /// Total number of retry re-dispatches of unacknowledged requests.
    pub requests_resent_total: IntCounter,
    /// Total number of requests acknowledged by their target robot.
    pub requests_acknowledged_total: IntCounter,
    /// Total number of requests rejected by validation before dispatch.
    pub requests_rejected_total: IntCounter,
    /// The number of robots currently known to the manager.
    pub robots_known: IntGauge,
    /// The number of requests currently awaiting acknowledgment.
    pub unacknowledged_requests: IntGauge,
}

impl Metrics {
    /// Creates a new `Metrics` struct, initializing and registering all collectors.
    pub fn new() -> Self {
        // Create a custom registry to avoid conflicts with default metrics.
        let registry = Registry::new_custom(Some("fleet_manager".into()), None)
            .expect("Failed to create custom metrics registry");

        // A helper macro to create, register, and return a metric collector.
        macro_rules! reg {
            ($metric:expr) => {{
                let collector = $metric;
                registry
                    .register(Box::new(collector.clone()))
                    .expect("Failed to register metric");
                collector
            }};
        }

        Self {
            states_received_total: reg!(IntCounter::new(
                "states_received_total",
                "Total number of robot state reports ingested"
            )
            .unwrap()),
            robots_registered_total: reg!(IntCounter::new(
                "robots_registered_total",
                "Total number of robots ever registered"
            )
            .unwrap()),
            requests_sent_total: reg!(IntCounter::new(
                "requests_sent_total",
                "Total number of requests dispatched for the first time"
            )
            .unwrap()),
            requests_resent_total: reg!(IntCounter::new(
                "requests_resent_total",
                "Total number of unacknowledged-request re-dispatches"
            )
            .unwrap()),
            requests_acknowledged_total: reg!(IntCounter::new(
                "requests_acknowledged_total",
                "Total number of requests acknowledged by robots"
            )
            .unwrap()),
            requests_rejected_total: reg!(IntCounter::new(
                "requests_rejected_total",
                "Total number of requests rejected by validation"
            )
            .unwrap()),
            robots_known: reg!(IntGauge::new(
                "robots_known",
                "Number of robots currently known to the manager"
            )
            .unwrap()),
            unacknowledged_requests: reg!(IntGauge::new(
                "unacknowledged_requests",
                "Number of requests currently awaiting acknowledgment"
            )
            .unwrap()),
            registry,
        }
    }

    /// Creates an `axum::Router` that serves the metrics on the `/metrics` endpoint.
    pub fn router(&self) -> Router {
        let registry = self.registry.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let registry = registry.clone();
                async move {
                    let metric_families = registry.gather();
                    let mut buffer = Vec::new();
                    let encoder = TextEncoder::new();
                    encoder
                        .encode(&metric_families, &mut buffer)
                        .expect("Failed to encode metrics");
                    String::from_utf8(buffer)
                        .expect("Metrics buffer is not valid UTF-8")
                        .into_response()
                }
            }),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
