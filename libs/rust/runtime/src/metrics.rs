//! Prometheus metrics for round execution and neighbor exchange.

use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram, IntCounter, IntCounterVec, TextEncoder};

pub struct RoundMetrics {
    pub rounds_total: IntCounter,
    pub round_failures_total: IntCounterVec,
    pub exports_published_total: IntCounter,
    pub exports_suppressed_total: IntCounter,
    pub evaluation_latency_ms: Histogram,
}

pub struct ExchangeMetrics {
    pub messages_received_total: IntCounter,
    pub decode_errors_total: IntCounter,
    pub stale_evictions_total: IntCounter,
}

// Registration only fails on duplicate names, which the Lazy guards rule out.
pub static ROUND_METRICS: Lazy<RoundMetrics> = Lazy::new(|| RoundMetrics {
    rounds_total: register_int_counter!("field_rounds_total", "Rounds completed successfully").expect("register field_rounds_total"),
    round_failures_total: register_int_counter_vec!("field_round_failures_total", "Rounds abandoned, by error kind", &["kind"]).expect("register field_round_failures_total"),
    exports_published_total: register_int_counter!("field_exports_published_total", "Exports handed to the exchange").expect("register field_exports_published_total"),
    exports_suppressed_total: register_int_counter!("field_exports_suppressed_total", "Unchanged exports not republished").expect("register field_exports_suppressed_total"),
    evaluation_latency_ms: register_histogram!("field_evaluation_latency_ms", "Interpreter time per round in milliseconds", vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 50.0]).expect("register field_evaluation_latency_ms"),
});

pub static EXCHANGE_METRICS: Lazy<ExchangeMetrics> = Lazy::new(|| ExchangeMetrics {
    messages_received_total: register_int_counter!("field_messages_received_total", "Neighbor messages stored in a neighbor table").expect("register field_messages_received_total"),
    decode_errors_total: register_int_counter!("field_decode_errors_total", "Inbound messages that failed to decode").expect("register field_decode_errors_total"),
    stale_evictions_total: register_int_counter!("field_stale_evictions_total", "Neighbor entries dropped for staleness").expect("register field_stale_evictions_total"),
});

/// Renders the default registry in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
