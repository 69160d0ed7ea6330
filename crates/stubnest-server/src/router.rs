//! Admin/stub classification for accepted requests.
//!
//! Classification is purely a path-prefix check. Administrative requests are
//! control-plane operations and bypass the interception pipeline and the
//! fault injector entirely; everything else proceeds to stub matching.

/// Which plane a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Admin,
    Stub,
}

/// Classify a request path against the configured admin prefix.
///
/// The prefix matches itself and any path nested under it; `/__adminextra`
/// does not count as admin traffic for prefix `/__admin`.
pub fn route(path: &str, admin_prefix: &str) -> RouteKind {
    if path == admin_prefix {
        return RouteKind::Admin;
    }
    match path.strip_prefix(admin_prefix) {
        Some(rest) if rest.starts_with('/') => RouteKind::Admin,
        _ => RouteKind::Stub,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_prefix_matches() {
        assert_eq!(route("/__admin", "/__admin"), RouteKind::Admin);
        assert_eq!(route("/__admin/mappings", "/__admin"), RouteKind::Admin);
        assert_eq!(route("/__admin/requests", "/__admin"), RouteKind::Admin);
    }

    #[test]
    fn test_stub_paths() {
        assert_eq!(route("/", "/__admin"), RouteKind::Stub);
        assert_eq!(route("/api/orders", "/__admin"), RouteKind::Stub);
        // Shares the prefix characters but is not nested under it.
        assert_eq!(route("/__administrator", "/__admin"), RouteKind::Stub);
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(route("/control/mappings", "/control"), RouteKind::Admin);
        assert_eq!(route("/__admin/mappings", "/control"), RouteKind::Stub);
    }
}
