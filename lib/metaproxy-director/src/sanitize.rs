//! Outbound header construction

use metaproxy_core::headers::names;
use metaproxy_core::HeaderSet;

pub use metaproxy_core::headers::{is_denied, DENIED_HEADERS};

/// Escape prefix stripped from the start of every copied value
pub const RESERVED_VALUE_PREFIX: &str = "rancher:";

fn strip_reserved_prefix(value: &str) -> &str {
    value.strip_prefix(RESERVED_VALUE_PREFIX).unwrap_or(value)
}

/// Build the outbound header set from the inbound one
pub fn sanitize_headers(inbound: &HeaderSet, hostname: &str, is_tls: bool) -> HeaderSet {
    let mut outbound = HeaderSet::new();

    for (name, values) in inbound.iter() {
        if is_denied(name) {
            continue;
        }
        let values = values
            .iter()
            .map(|v| strip_reserved_prefix(v).to_string())
            .collect();
        outbound.set_all(name, values);
    }

    outbound.set(names::HOST, hostname);
    if is_tls {
        outbound.set(names::FORWARDED_PROTO, "https");
    }

    outbound
}

/// Drop deny-listed headers a signer may have written and pin `Host` again
pub fn enforce_denied(headers: &mut HeaderSet, hostname: &str) {
    let denied: Vec<String> = headers
        .names()
        .filter(|name| is_denied(name))
        .map(str::to_string)
        .collect();
    for name in &denied {
        headers.remove(name);
    }
    headers.set(names::HOST, hostname);
}
