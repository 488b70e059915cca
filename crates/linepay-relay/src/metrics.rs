use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Inbound relay calls by operation and outcome
pub static RELAY_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("relay_requests_total", "Total number of relayed payment calls"),
        &["operation", "outcome"],
    )
    .unwrap()
});

pub static UPSTREAM_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "relay_upstream_latency_seconds",
            "Latency of signed calls to the payment gateway",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0]),
        &["operation"],
    )
    .unwrap()
});

static REGISTER: Once = Once::new();

/// Register all metrics with the registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(RELAY_REQUESTS_TOTAL.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(UPSTREAM_LATENCY.clone()))
            .unwrap();
    });
}

/// Count one finished relay call.
pub fn record_outcome(operation: &str, outcome: &str) {
    RELAY_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Render the registry in the Prometheus text format.
pub fn metrics_output() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent_and_exports_counters() {
        register_metrics();
        register_metrics();
        record_outcome("request", "ok");

        let output = metrics_output().unwrap();
        assert!(output.contains("relay_requests_total"));
        assert!(output.contains(r#"operation="request""#));
    }
}
