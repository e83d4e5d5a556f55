//! Request and refresh counters, exposed in OpenMetrics text form at
//! `/metrics`.

use prometheus_client::encoding::text;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KeysRequestLabels {
    pub code: String,
    pub host: String,
    pub user: String,
}

/// Container for every metric the server exposes.
pub struct Metrics {
    registry: Registry,
    /// Key lookups by response code, hostname and account.
    pub keys_requests: Family<KeysRequestLabels, Counter>,
    /// Remote fetches that failed and kept the previous cached value.
    pub key_fetch_failures: Counter,
}

impl Metrics {
    pub fn new() -> Metrics {
        let mut registry = Registry::default();

        let keys_requests = Family::<KeysRequestLabels, Counter>::default();
        registry.register(
            "keyward_keys_requests",
            "Total requests for keys",
            keys_requests.clone(),
        );

        let key_fetch_failures = Counter::default();
        registry.register(
            "keyward_key_fetch_failures",
            "Remote key fetches that failed, leaving the cached value in place",
            key_fetch_failures.clone(),
        );

        Metrics { registry, keys_requests, key_fetch_failures }
    }

    /// Record one `/api/v1/keys` request.
    pub fn record_keys_request(&self, code: u16, host: &str, user: &str) {
        self.keys_requests
            .get_or_create(&KeysRequestLabels {
                code: code.to_string(),
                host: host.to_string(),
                user: user.to_string(),
            })
            .inc();
    }

    /// Encode the registry in OpenMetrics text form.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_appear_in_encoded_output() {
        let metrics = Metrics::new();
        metrics.record_keys_request(200, "web1", "alice");
        metrics.record_keys_request(200, "web1", "alice");
        metrics.record_keys_request(400, "ghost", "bob");
        metrics.key_fetch_failures.inc();

        let out = metrics.encode().unwrap();
        assert!(out.contains("keyward_keys_requests_total"));
        assert!(out.contains("code=\"200\""));
        assert!(out.contains("host=\"web1\""));
        assert!(out.contains("keyward_key_fetch_failures_total 1"));
    }

    #[test]
    fn repeated_requests_accumulate() {
        let metrics = Metrics::new();
        for _ in 0..3 {
            metrics.record_keys_request(200, "h", "u");
        }
        let labels = KeysRequestLabels {
            code: "200".into(),
            host: "h".into(),
            user: "u".into(),
        };
        assert_eq!(metrics.keys_requests.get_or_create(&labels).get(), 3);
    }
}
