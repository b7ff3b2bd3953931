#![forbid(unsafe_code)]

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Request-engine counters, exposed in prometheus text format.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    retries_total: IntCounterVec,
    error_actions_total: IntCounterVec,
    suppressed_total: IntCounterVec,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, String> {
        let registry =
            Registry::new_custom(Some("franz".to_string()), None).map_err(|err| err.to_string())?;

        let requests_total = IntCounterVec::new(
            Opts::new(
                "engine_requests_total",
                "Requests enqueued by API key and version",
            ),
            &["api_key", "api_version"],
        )
        .map_err(|err| err.to_string())?;
        let retries_total = IntCounterVec::new(
            Opts::new("engine_retries_total", "Request retries by API key"),
            &["api_key"],
        )
        .map_err(|err| err.to_string())?;
        let error_actions_total = IntCounterVec::new(
            Opts::new(
                "engine_error_actions_total",
                "Classified reply errors by error name and action set",
            ),
            &["error", "actions"],
        )
        .map_err(|err| err.to_string())?;
        let suppressed_total = IntCounterVec::new(
            Opts::new(
                "engine_suppressed_total",
                "Full metadata requests suppressed by an identical in-transit request",
            ),
            &["kind"],
        )
        .map_err(|err| err.to_string())?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(|err| err.to_string())?;
        registry
            .register(Box::new(retries_total.clone()))
            .map_err(|err| err.to_string())?;
        registry
            .register(Box::new(error_actions_total.clone()))
            .map_err(|err| err.to_string())?;
        registry
            .register(Box::new(suppressed_total.clone()))
            .map_err(|err| err.to_string())?;

        Ok(Self {
            registry,
            requests_total,
            retries_total,
            error_actions_total,
            suppressed_total,
        })
    }

    pub fn record_request(&self, api_key: &str, api_version: i16) {
        let api_version = api_version.to_string();
        self.requests_total
            .with_label_values(&[api_key, &api_version])
            .inc();
    }

    pub fn record_retry(&self, api_key: &str) {
        self.retries_total.with_label_values(&[api_key]).inc();
    }

    pub fn record_error_action(&self, error: &str, actions: &str) {
        self.error_actions_total
            .with_label_values(&[error, actions])
            .inc();
    }

    pub fn record_suppressed(&self, kind: &str) {
        self.suppressed_total.with_label_values(&[kind]).inc();
    }

    pub fn render_prometheus(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut output = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut output)
            .map_err(|err| err.to_string())?;
        String::from_utf8(output).map_err(|err| err.to_string())
    }
}
