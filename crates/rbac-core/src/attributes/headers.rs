//! Request header facts.
//!
//! Header names are case-insensitive and stored lower-cased. A name may repeat;
//! lookups join repeated values with `,` the way HTTP folds them.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Deserialize;

/// Ordered, case-insensitive request header list.
///
/// `RequestHeaders::default()` is the empty header set used when a decision is
/// taken before headers are available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct RequestHeaders {
    entries: Vec<(String, String)>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header; the name is lower-cased.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .push((name.as_ref().to_ascii_lowercase(), value.into()));
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_all(name).next().is_some()
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'s, 'n>(&'s self, name: &'n str) -> impl Iterator<Item = &'s str> + 'n
    where
        's: 'n,
    {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value for `name`; repeated headers are joined with `,`.
    pub fn get(&self, name: &str) -> Option<Cow<'_, str>> {
        let mut values = self.get_all(name);
        let first = values.next()?;
        match values.next() {
            None => Some(Cow::Borrowed(first)),
            Some(second) => {
                let mut joined = format!("{first},{second}");
                for v in values {
                    joined.push(',');
                    joined.push_str(v);
                }
                Some(Cow::Owned(joined))
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `:method` pseudo-header.
    pub fn method(&self) -> Option<&str> {
        self.get_all(":method").next()
    }

    /// `:path` pseudo-header without the query string or fragment.
    pub fn url_path(&self) -> Option<&str> {
        let path = self.get_all(":path").next()?;
        let end = path.find(['?', '#']).unwrap_or(path.len());
        Some(&path[..end])
    }

    /// `:authority`, falling back to `host`.
    pub fn host(&self) -> Option<&str> {
        self.get_all(":authority")
            .next()
            .or_else(|| self.get_all("host").next())
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for RequestHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut h = RequestHeaders::new();
        for (k, v) in iter {
            h.insert(k, v);
        }
        h
    }
}

impl From<BTreeMap<String, String>> for RequestHeaders {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn value_outlives_the_lookup_name() {
        let h = RequestHeaders::new().with("x-env", "prod");
        let value = {
            let name = String::from("X-Env");
            h.get(&name)
        };
        assert_eq!(value.as_deref(), Some("prod"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let h = RequestHeaders::new().with("X-Env", "prod");
        assert_eq!(h.get("x-env").as_deref(), Some("prod"));
        assert_eq!(h.get("X-ENV").as_deref(), Some("prod"));
        assert!(h.get("x-other").is_none());
    }

    #[test]
    fn repeated_values_are_joined() {
        let h: RequestHeaders = [("accept", "a"), ("Accept", "b"), ("accept", "c")]
            .into_iter()
            .collect();
        assert_eq!(h.get("accept").as_deref(), Some("a,b,c"));
        assert_eq!(h.get_all("accept").count(), 3);
    }

    #[test]
    fn url_path_drops_query_and_fragment() {
        let h = RequestHeaders::new().with(":path", "/api/v1/users?id=3#top");
        assert_eq!(h.url_path(), Some("/api/v1/users"));
    }

    #[test]
    fn host_falls_back_to_host_header() {
        let h = RequestHeaders::new().with("Host", "example.com");
        assert_eq!(h.host(), Some("example.com"));
        let h = h.with(":authority", "api.example.com");
        assert_eq!(h.host(), Some("api.example.com"));
    }

    #[test]
    fn deserializes_from_json_object() {
        let h: RequestHeaders =
            serde_json::from_str(r#"{":method":"GET","X-Env":"prod"}"#).unwrap();
        assert_eq!(h.method(), Some("GET"));
        assert_eq!(h.get("x-env").as_deref(), Some("prod"));
    }
}
