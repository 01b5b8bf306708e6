//! Request routing for the gateway's HTTP surface

use tracing::debug;

/// Where a request is handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Health,
    Metrics,
    Proxy,
    NotFound,
}

pub struct Router {
    prefix: String,
}

impl Router {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Match a cleaned request path
    pub fn route(&self, method: &str, path: &str) -> Route {
        let route = if path == "/healthz" {
            Route::Health
        } else if path == "/metrics" && method.eq_ignore_ascii_case("GET") {
            Route::Metrics
        } else if path.contains(&self.prefix) {
            Route::Proxy
        } else {
            Route::NotFound
        };
        debug!("{} {} routed to {:?}", method, path, route);
        route
    }
}

/// Collapse runs of `/` into one, as ingress path cleaning does
pub fn clean_path(path: &str) -> String {
    let mut cleaned = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        cleaned.push(c);
    }
    cleaned
}
