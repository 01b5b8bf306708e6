//! Cookie isolation between the proxy's origin and destinations

use metaproxy_core::headers::names;
use metaproxy_core::{HeaderSet, ProxyResponse};

/// Drop the caller's session cookies and promote the side-channel cookie
pub fn isolate_cookies(headers: &mut HeaderSet) {
    headers.remove(names::COOKIE);

    let promoted = headers
        .get(names::API_COOKIE)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    if let Some(cookie) = promoted {
        headers.set(names::COOKIE, cookie);
        headers.remove(names::API_COOKIE);
    }
}

/// Move every `Set-Cookie` value into the side-channel response header
pub fn relocate_set_cookies(response: &mut ProxyResponse) {
    response.headers.remove(names::API_SET_COOKIE);
    for cookie in response.headers.remove(names::SET_COOKIE) {
        response.headers.append(names::API_SET_COOKIE, cookie);
    }
}
