use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Well-known dict keys (spec §3.1). Any key is allowed; these are just the
/// ones the core itself reads.
pub mod keys {
    pub const NODE_NAME: &str = "node.name";
    pub const MEDIA_CLASS: &str = "media.class";
    pub const AUDIO_RATE: &str = "audio.rate";
    pub const PRIORITY_DRIVER: &str = "priority.driver";
    pub const LINK_PASSIVE: &str = "link.passive";
    pub const LINK_MAX_BUFFERS: &str = "link.max-buffers";
    /// Endpoint ids a `CreateObject` request against the link factory
    /// carries in its props, since the wire protocol has no dedicated
    /// link-creation method (spec §6.1's `create_object` is generic over
    /// factory name).
    pub const LINK_OUTPUT_NODE: &str = "link.output.node";
    pub const LINK_OUTPUT_PORT: &str = "link.output.port";
    pub const LINK_INPUT_NODE: &str = "link.input.node";
    pub const LINK_INPUT_PORT: &str = "link.input.port";
    /// Current namespace for latency properties; `pinos.latency.*` keys are
    /// translated to this namespace on ingest (spec §9).
    pub const NODE_LATENCY: &str = "node.latency";

    /// Session-manager extension props (spec §6.1): which `Session` an
    /// `Endpoint`/`EndpointLink` create request belongs to, which
    /// `Endpoint` an `EndpointStream` create request belongs to, and which
    /// two Endpoints an `EndpointLink` create request joins — the same
    /// generic-`create_object`-carries-its-args-in-props pattern
    /// `LINK_OUTPUT_NODE` etc. already use for the plain Node/Link factory.
    pub const ENDPOINT_SESSION: &str = "endpoint.session";
    pub const ENDPOINT_STREAM_ENDPOINT: &str = "endpoint-stream.endpoint";
    pub const ENDPOINT_LINK_SESSION: &str = "endpoint-link.session";
    pub const ENDPOINT_LINK_OUTPUT_ENDPOINT: &str = "endpoint-link.output-endpoint";
    pub const ENDPOINT_LINK_INPUT_ENDPOINT: &str = "endpoint-link.input-endpoint";
    const LEGACY_LATENCY_PREFIX: &str = "pinos.latency.";
    const CURRENT_LATENCY_PREFIX: &str = "pipewire.latency.";

    /// Translate a legacy `pinos.latency.*` / `pipewire.latency.*` key to the
    /// preferred namespace. Keys outside either prefix are returned unchanged.
    pub fn normalize_latency_key(key: &str) -> String {
        if let Some(rest) = key.strip_prefix(LEGACY_LATENCY_PREFIX) {
            format!("{CURRENT_LATENCY_PREFIX}{rest}")
        } else {
            key.to_string()
        }
    }
}

/// Unordered set of string key/value pairs (spec §3.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dict(HashMap<String, String>);

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = keys::normalize_latency_key(&key.into());
        self.0.insert(key, value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).map(|v| matches!(v, "true" | "1"))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` into `self`, `other` taking precedence on key clashes.
    pub fn merge(&mut self, other: &Dict) {
        for (k, v) in other.iter() {
            self.0.insert(k.to_string(), v.to_string());
        }
    }
}

impl FromIterator<(String, String)> for Dict {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Dict(iter.into_iter().collect())
    }
}
