//! Extraction of the destination URL embedded in a proxy path

use crate::error::{DirectorError, Result};
use url::Url;

/// Restore `scheme:/x` (ingress path cleaning collapses `//`) to `scheme://x`.
///
/// Mirrors the patterns `^https:/([^/])` and `^http:/([^/])`, checked in that order.
fn restore_scheme(tail: &str) -> Option<String> {
    for scheme in ["https", "http"] {
        if let Some(rest) = tail
            .strip_prefix(scheme)
            .and_then(|t| t.strip_prefix(":/"))
        {
            if rest.chars().next().is_some_and(|c| c != '/') {
                return Some(format!("{}://{}", scheme, rest));
            }
        }
    }
    None
}

/// Resolve the destination embedded after `prefix` in `path`.
///
/// Without a recognised scheme the destination defaults to `https`. The
/// inbound `query` replaces any query carried by the embedded destination.
pub fn resolve_destination(prefix: &str, path: &str, query: Option<&str>) -> Result<Url> {
    let index = path.find(prefix).ok_or_else(|| DirectorError::DestinationParse {
        destination: path.to_string(),
        reason: format!("path does not contain proxy prefix {:?}", prefix),
    })?;
    let tail = &path[index + prefix.len()..];

    let destination = restore_scheme(tail).unwrap_or_else(|| format!("https://{}", tail));

    let mut url = Url::parse(&destination).map_err(|e| DirectorError::DestinationParse {
        destination: destination.clone(),
        reason: e.to_string(),
    })?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(DirectorError::DestinationParse {
            destination,
            reason: "missing host".to_string(),
        });
    }

    url.set_fragment(None);
    match query {
        Some(q) if !q.is_empty() => url.set_query(Some(q)),
        _ => url.set_query(None),
    }

    Ok(url)
}

/// Host as matched against the allow-list: hostname plus any explicit non-default port
pub fn authority_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}
