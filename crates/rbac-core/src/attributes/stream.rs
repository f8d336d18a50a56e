//! Stream-level facts recorded by earlier processing stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-stream facts. Dynamic metadata is namespaced by the filter that wrote it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamInfo {
    /// Negotiated application protocol (e.g. `HTTP/2`).
    #[serde(default)]
    pub protocol: Option<String>,
    /// Filter name → metadata document.
    #[serde(default)]
    pub dynamic_metadata: BTreeMap<String, Value>,
}

impl StreamInfo {
    /// Builder-style metadata insert.
    pub fn with_metadata(mut self, filter: impl Into<String>, value: Value) -> Self {
        self.dynamic_metadata.insert(filter.into(), value);
        self
    }

    /// Walk `path` through the objects stored under `filter`.
    pub fn metadata<S: AsRef<str>>(&self, filter: &str, path: &[S]) -> Option<&Value> {
        let mut cur = self.dynamic_metadata.get(filter)?;
        for key in path {
            cur = cur.as_object()?.get(key.as_ref())?;
        }
        Some(cur)
    }
}
