//! Ordered query parameter list.

use url::form_urlencoded::byte_serialize;

/// Query parameters in emission order.
///
/// Keys keep their bracket structure literally and field names inside keys
/// are form-urlencoded. Values are form-urlencoded except for `:` and `,`,
/// which the backend reads as the sort direction and list separators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        self.pairs.push((key.into(), encode_value(value.as_ref())));
    }

    pub fn extend(&mut self, other: QueryParams) {
        self.pairs.extend(other.pairs);
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Render as `k=v&k=v`.
    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Form-urlencode one component.
pub(crate) fn encode(s: &str) -> String {
    byte_serialize(s.as_bytes()).collect()
}

/// Form-urlencode a value, leaving `:` and `,` literal.
///
/// A literal `%` in the input is already `%25` here, so the restored
/// escapes can only come from `:` and `,`.
pub(crate) fn encode_value(s: &str) -> String {
    encode(s).replace("%3A", ":").replace("%2C", ",")
}

/// `[a][b]` for a dotted field id `a.b`.
pub(crate) fn bracket_path(field_id: &str) -> String {
    field_id
        .split('.')
        .filter(|seg| !seg.is_empty())
        .map(|seg| format!("[{}]", encode(seg)))
        .collect()
}
