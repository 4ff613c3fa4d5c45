//! Deployment cache
//!
//! Maps route identity to a previously published function handle. Written
//! only by the registrar before the server accepts traffic, read by every
//! invocation pipeline afterwards; that ordering is the only synchronization
//! required.

use dashmap::DashMap;
use std::fmt;

use crate::platform::FunctionHandle;

/// Stable route identity: method + path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteId(String);

impl RouteId {
    pub fn new(method: &str, path: &str) -> Self {
        Self(format!("{} {}", method.to_uppercase(), path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// At most one deploy per route for the process lifetime; a redeploy
/// requires a restart.
#[derive(Debug, Default)]
pub struct DeploymentCache {
    handles: DashMap<RouteId, FunctionHandle>,
}

impl DeploymentCache {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
        }
    }

    pub fn put(&self, route: RouteId, handle: FunctionHandle) {
        self.handles.insert(route, handle);
    }

    pub fn get(&self, route: &RouteId) -> Option<FunctionHandle> {
        self.handles.get(route).map(|h| h.clone())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_id_normalizes_method_case() {
        assert_eq!(RouteId::new("get", "/foo"), RouteId::new("GET", "/foo"));
        assert_eq!(RouteId::new("GET", "/foo").as_str(), "GET /foo");
    }

    #[test]
    fn test_put_then_get() {
        let cache = DeploymentCache::new();
        let route = RouteId::new("GET", "/foo");

        assert!(cache.get(&route).is_none());

        cache.put(route.clone(), FunctionHandle::new("arn:foo"));
        let handle = cache.get(&route).unwrap();
        assert_eq!(handle.identity, "arn:foo");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_for_other_route() {
        let cache = DeploymentCache::new();
        cache.put(RouteId::new("GET", "/foo"), FunctionHandle::new("arn:foo"));

        assert!(cache.get(&RouteId::new("POST", "/foo")).is_none());
        assert!(cache.get(&RouteId::new("GET", "/bar")).is_none());
    }
}
