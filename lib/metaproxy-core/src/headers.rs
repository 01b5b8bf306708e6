//! Ordered header multi-map with case-insensitive names

/// Reserved header names used by the director
pub mod names {
    pub const HOST: &str = "Host";
    pub const FORWARDED_PROTO: &str = "X-Forwarded-Proto";
    /// Direct bearer credential supplied by the caller
    pub const API_AUTH: &str = "X-API-Auth-Header";
    /// Delegated credential reference resolved by a signer
    pub const CATTLE_AUTH: &str = "X-API-CattleAuth-Header";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const SET_COOKIE: &str = "Set-Cookie";
    pub const COOKIE: &str = "Cookie";
    /// Side-channel carrying destination cookies back to the caller
    pub const API_SET_COOKIE: &str = "X-Api-Set-Cookie-Header";
    /// Side-channel carrying caller cookies to the destination
    pub const API_COOKIE: &str = "X-Api-Cookie-Header";
    /// Marks responses generated by the proxy itself
    pub const PROXY_ERROR: &str = "X-Api-Proxy-Error";
}

/// Headers never copied from the inbound request, nor written by a signer (lowercase)
pub const DENIED_HEADERS: &[&str] = &[
    // framing of the new connection
    "host",
    "transfer-encoding",
    "content-length",
    // credentials, re-derived by the auth resolver
    "x-api-auth-header",
    "x-api-cattleauth-header",
    // client IP / trace headers from the edge
    "cf-connecting-ip",
    "cf-ray",
    // privileged impersonation
    "impersonate-user",
    "impersonate-group",
];

pub fn is_denied(name: &str) -> bool {
    DENIED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// A sequence of `(name, values)` entries.
///
/// Names compare ASCII case-insensitively and keep the spelling they were
/// first inserted with. Entry order and value order are preserved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// First value of a header, if any
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|i| self.entries[i].1.first())
            .map(String::as_str)
    }

    /// All values of a header, in order
    pub fn get_all(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(i) => &self.entries[i].1,
            None => &[],
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Add a value, keeping existing ones
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        match self.position(name) {
            Some(i) => self.entries[i].1.push(value.into()),
            None => self.entries.push((name.to_string(), vec![value.into()])),
        }
    }

    /// Replace every value of a header with a single one
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.set_all(name, vec![value.into()]);
    }

    /// Replace every value of a header
    pub fn set_all(&mut self, name: &str, values: Vec<String>) {
        match self.position(name) {
            Some(i) => self.entries[i].1 = values,
            None => self.entries.push((name.to_string(), values)),
        }
    }

    /// Remove a header, returning its values
    pub fn remove(&mut self, name: &str) -> Vec<String> {
        match self.position(name) {
            Some(i) => self.entries.remove(i).1,
            None => Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of distinct header names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: AsRef<str>, V: Into<String>> FromIterator<(N, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = HeaderSet::new();
        for (name, value) in iter {
            headers.append(name.as_ref(), value);
        }
        headers
    }
}
