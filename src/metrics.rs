use prometheus::{CounterVec, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

use crate::limiter::LimitType;

/// Metrics collector for rate limit decisions
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    total_requests: CounterVec,
    allowed_requests: CounterVec,
    denied_requests: CounterVec,
    errors: CounterVec,
    request_duration: Histogram,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let total_requests = CounterVec::new(
            Opts::new(
                "ratelimit_total_requests",
                "Total number of rate limit checks",
            ),
            &["limit_type"],
        )?;

        let allowed_requests = CounterVec::new(
            Opts::new(
                "ratelimit_allowed_requests",
                "Number of requests admitted within their quota",
            ),
            &["limit_type"],
        )?;

        let denied_requests = CounterVec::new(
            Opts::new(
                "ratelimit_denied_requests",
                "Number of requests rejected for exceeding their quota or while blocked",
            ),
            &["limit_type"],
        )?;

        let errors = CounterVec::new(
            Opts::new("ratelimit_errors", "Number of failed rate limit checks"),
            &["kind"],
        )?;

        let request_duration = Histogram::with_opts(HistogramOpts::new(
            "ratelimit_request_duration_seconds",
            "Duration of rate limit checks in seconds",
        ))?;

        registry.register(Box::new(total_requests.clone()))?;
        registry.register(Box::new(allowed_requests.clone()))?;
        registry.register(Box::new(denied_requests.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            total_requests,
            allowed_requests,
            denied_requests,
            errors,
            request_duration,
        })
    }

    /// Get the Prometheus registry for this metrics instance
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_total_request(&self, limit_type: LimitType) {
        self.total_requests
            .with_label_values(&[limit_type.as_str()])
            .inc();
    }

    pub fn record_allowed_request(&self, limit_type: LimitType) {
        self.allowed_requests
            .with_label_values(&[limit_type.as_str()])
            .inc();
    }

    pub fn record_denied_request(&self, limit_type: LimitType) {
        self.denied_requests
            .with_label_values(&[limit_type.as_str()])
            .inc();
    }

    pub fn record_error(&self, kind: &str) {
        self.errors.with_label_values(&[kind]).inc();
    }

    /// Create a timer for measuring check duration
    pub fn start_request_timer(&self) -> prometheus::HistogramTimer {
        self.request_duration.start_timer()
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<String> {
        prometheus::TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();

        metrics.record_total_request(LimitType::Ip);
        metrics.record_allowed_request(LimitType::Ip);
        metrics.record_denied_request(LimitType::Token);
        metrics.record_error("store");

        let _timer = metrics.start_request_timer();
    }

    #[test]
    fn test_metrics_gathering() {
        let metrics = Metrics::new().unwrap();
        metrics.record_total_request(LimitType::Token);
        metrics.record_denied_request(LimitType::Token);

        let families = metrics.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "ratelimit_total_requests"));

        let text = metrics.encode().unwrap();
        assert!(text.contains("ratelimit_denied_requests{limit_type=\"token\"} 1"));
    }
}
