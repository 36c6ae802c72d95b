//! Session id routing suffixes.
//!
//! Wire format: `<opaque-id>.<routeTag>` when a route tag is configured,
//! plain `<opaque-id>` otherwise.  A load balancer pins clients to the node
//! named by the suffix; on failover the suffix is rewritten to the node
//! that adopted the session.

/// Split an id into its opaque part and its route tag, if any.
pub fn split_route(id: &str) -> (&str, Option<&str>) {
    match id.rsplit_once('.') {
        Some((base, route)) if !base.is_empty() && !route.is_empty() => (base, Some(route)),
        _ => (id, None),
    }
}

/// Append `route` to an opaque id.
pub fn with_route(base: &str, route: Option<&str>) -> String {
    match route {
        Some(r) => format!("{base}.{r}"),
        None => base.to_owned(),
    }
}

/// Replace the routing suffix of `id` with this node's `route`.  With no
/// route configured the suffix is simply dropped.
pub fn route_adjusted(id: &str, route: Option<&str>) -> String {
    let (base, _) = split_route(id);
    with_route(base, route)
}

/// Store keys to try for a requested id, in lookup order: the id itself,
/// the route-adjusted id, then the bare opaque id.
pub fn lookup_keys(id: &str, route: Option<&str>) -> Vec<String> {
    let mut keys = vec![id.to_owned()];
    for candidate in [route_adjusted(id, route), split_route(id).0.to_owned()] {
        if !keys.contains(&candidate) {
            keys.push(candidate);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_with_and_without_route() {
        assert_eq!(split_route("abc.node1"), ("abc", Some("node1")));
        assert_eq!(split_route("abc"), ("abc", None));
        assert_eq!(split_route("a.b.c"), ("a.b", Some("c")));
        assert_eq!(split_route("abc."), ("abc.", None));
    }

    #[test]
    fn adjust_rewrites_suffix() {
        assert_eq!(route_adjusted("X.A", Some("B")), "X.B");
        assert_eq!(route_adjusted("X", Some("B")), "X.B");
        assert_eq!(route_adjusted("X.A", None), "X");
    }

    #[test]
    fn lookup_order_is_requested_adjusted_bare() {
        assert_eq!(lookup_keys("X.A", Some("B")), vec!["X.A", "X.B", "X"]);
        assert_eq!(lookup_keys("X.B", Some("B")), vec!["X.B", "X"]);
        assert_eq!(lookup_keys("X", None), vec!["X"]);
    }
}
