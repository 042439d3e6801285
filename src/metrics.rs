use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub pages_fetched: IntCounter,
    pub results_emitted: IntCounter,
    pub crawls_performed: IntCounter,
    pub crawl_failures: IntCounter,
    pub blocked_responses: IntCounter,
    pub transport_errors: IntCounter,
    registry: Arc<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::with_opts(Opts::new(name, help).namespace("fedsearch"))
        .expect("static counter options are valid");
    registry.register(Box::new(counter.clone())).ok();
    counter
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        Metrics {
            pages_fetched: counter(&registry, "pages_fetched", "Number of search pages fetched"),
            results_emitted: counter(
                &registry,
                "results_emitted",
                "Number of results handed to listeners",
            ),
            crawls_performed: counter(
                &registry,
                "crawls_performed",
                "Number of preliminary results crawled",
            ),
            crawl_failures: counter(
                &registry,
                "crawl_failures",
                "Number of crawls that failed to download or expand",
            ),
            blocked_responses: counter(
                &registry,
                "blocked_responses",
                "Number of anti-bot challenge pages rejected",
            ),
            transport_errors: counter(
                &registry,
                "transport_errors",
                "Number of timeouts, bad statuses and connection failures",
            ),
            registry: Arc::new(registry),
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
