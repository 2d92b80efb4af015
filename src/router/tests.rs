use super::{PathInfo, RouterBuilder, SetupError};
use crate::dispatcher::element;
use http::Method;

fn noop() -> impl crate::dispatcher::Element {
    element(|_| Ok(()))
}

#[test]
fn test_empty_path_binds_prefix() {
    let mut root = RouterBuilder::new();
    root.get("", noop());
    root.group("/admin", |admin| {
        admin.get("", noop());
        admin.get("users", noop());
    });
    let site = root.build().unwrap();
    let paths: Vec<&str> = site.routes().iter().map(|r| r.path()).collect();
    assert_eq!(paths, vec!["/", "/admin", "/admin/users"]);
}

#[test]
fn test_own_routes_precede_child_routes() {
    let mut root = RouterBuilder::new();
    root.group("/g", |g| {
        g.get("/x", noop());
    });
    root.on(Method::GET, "/g", PathInfo::Capture, noop());
    let site = root.build().unwrap();

    // Declared after the group, but belongs to the root's own list
    let m = site.resolve(&Method::GET, "/g/x").unwrap();
    assert_eq!(m.route.router(), 0);
    assert_eq!(m.path_info.as_deref(), Some("x"));
}

#[test]
fn test_exact_index_respects_declaration_order() {
    let mut root = RouterBuilder::new();
    root.on(Method::GET, "/docs", PathInfo::Capture, noop());
    root.get("/docs/intro", noop());
    let site = root.build().unwrap();

    let m = site.resolve(&Method::GET, "/docs/intro").unwrap();
    assert_eq!(m.route.id(), 0);
    assert_eq!(m.path_info.as_deref(), Some("intro"));
}

#[test]
fn test_method_filtering() {
    let mut root = RouterBuilder::new();
    root.post("/form", noop());
    root.get("/form", noop());
    let site = root.build().unwrap();
    assert_eq!(site.resolve(&Method::GET, "/form").unwrap().route.id(), 1);
    assert_eq!(site.resolve(&Method::POST, "/form").unwrap().route.id(), 0);
    assert!(site.resolve(&Method::DELETE, "/form").is_none());
}

#[test]
fn test_exception_scope_is_nearest_ancestor() {
    let mut root = RouterBuilder::new();
    root.exception(noop());
    root.group("/a", |a| {
        a.group("/b", |b| {
            b.exception(noop());
            b.group("/c", |_| {});
        });
    });
    let site = root.build().unwrap();
    // nodes: 0 root, 1 /a, 2 /a/b, 3 /a/b/c
    assert_eq!(site.exception_handler(1).map(|(scope, _)| scope), Some(0));
    assert_eq!(site.exception_handler(2).map(|(scope, _)| scope), Some(2));
    assert_eq!(site.exception_handler(3).map(|(scope, _)| scope), Some(2));
    assert_eq!(site.ancestry(3), vec![3, 2, 1, 0]);
}

#[test]
fn test_effective_filter_lists() {
    let mut root = RouterBuilder::new();
    root.before(noop()).after(noop());
    root.group("/a", |a| {
        a.before(noop());
        a.before(noop());
        a.after(noop());
    });
    let site = root.build().unwrap();
    assert_eq!(site.before_filters(0).len(), 1);
    assert_eq!(site.before_filters(1).len(), 3);
    assert_eq!(site.after_filters(1).len(), 2);
}

#[test]
fn test_named_routes() {
    let mut root = RouterBuilder::new();
    root.group("/shop", |shop| {
        shop.get("/cart", noop()).name("cart");
    });
    let site = root.build().unwrap();
    assert_eq!(site.path_for("cart"), Some("/shop/cart"));
    assert_eq!(site.path_for("missing"), None);
}

#[test]
fn test_duplicate_names_are_rejected() {
    let mut root = RouterBuilder::new();
    root.get("/a", noop()).name("x");
    root.get("/b", noop()).name("x");
    assert_eq!(
        root.build().unwrap_err(),
        SetupError::DuplicateName {
            name: "x".to_string()
        }
    );
}

#[test]
fn test_invalid_path_is_rejected() {
    let mut root = RouterBuilder::new();
    root.get("/a?b", noop());
    assert!(matches!(
        root.build(),
        Err(SetupError::InvalidPath { .. })
    ));
}

#[test]
fn test_bad_template_fails_build() {
    let mut root = RouterBuilder::new();
    root.on(Method::GET, "/t", PathInfo::map(["{id:(}"]), noop());
    assert!(matches!(
        root.build(),
        Err(SetupError::InvalidConstraint { .. })
    ));
}

#[test]
fn test_prefix_join_inserts_separator() {
    let mut root = RouterBuilder::with_prefix("/api");
    root.group("v1", |v1| {
        v1.get("ping", noop());
    });
    let site = root.build().unwrap();
    assert_eq!(site.routes()[0].path(), "/api/v1/ping");
}
