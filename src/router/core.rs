//! Router core: the mutable setup phase and the frozen, read-only [`Site`].
//!
//! Setup happens once through a [`RouterBuilder`]. [`RouterBuilder::build`]
//! compiles every path-info template, precomputes the effective filter lists
//! and nearest exception handler of every router node, and freezes the
//! result. After that the tree is never mutated, so a `Site` can be shared
//! across request threads and continuation workers behind an `Arc`.

use super::error::SetupError;
use super::route::{HandlerFactory, MethodSet, PathInfo, Route};
use crate::dispatcher::Element;
use http::Method;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Maximum number of path/query parameters before heap allocation.
/// Most templates bind ≤4 params (e.g., `{year}/{month}/{slug}`).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage for the hot path.
///
/// Param names use `Arc<str>` so names taken from compiled templates clone in
/// O(1); values remain `String` as they're per-request data from the URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Shared, ordered list of filter elements.
pub type FilterList = Arc<[Arc<dyn Element>]>;

/// Result of successfully resolving a request to a route
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched route
    pub route: Arc<Route>,
    /// Raw path-info for `Capture`/`Map` routes, without the leading `/`
    pub path_info: Option<String>,
    /// Parameters bound by a `Map` template
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Get a path parameter by name
    ///
    /// Uses "last write wins" semantics when a template binds a name twice.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

struct RouteDecl {
    methods: MethodSet,
    path: String,
    path_info: PathInfo,
    handler: HandlerFactory,
    pausable: bool,
    name: Option<String>,
}

/// Handle to a route just declared on a [`RouterBuilder`].
pub struct RouteRef<'a> {
    decl: &'a mut RouteDecl,
}

impl RouteRef<'_> {
    /// Run this route's pipeline on a continuation worker so it may pause.
    pub fn pausable(self) -> Self {
        self.decl.pausable = true;
        self
    }

    /// Register a name usable with [`Site::path_for`].
    pub fn name(self, name: impl Into<String>) -> Self {
        self.decl.name = Some(name.into());
        self
    }
}

/// Mutable setup phase of a router tree.
///
/// Routes are tested in declaration order: a router's own routes first,
/// then each child group in the order the groups were declared.
pub struct RouterBuilder {
    prefix: String,
    routes: Vec<RouteDecl>,
    before: Vec<Arc<dyn Element>>,
    after: Vec<Arc<dyn Element>>,
    exception: Option<Arc<dyn Element>>,
    children: Vec<RouterBuilder>,
    errors: Vec<SetupError>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    /// Root router with an empty prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// Root router whose routes all live under `prefix`.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        let mut builder = Self {
            prefix: String::new(),
            routes: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            exception: None,
            children: Vec::new(),
            errors: Vec::new(),
        };
        builder.prefix = builder.join(prefix);
        builder
    }

    /// Effective prefix of this router
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Declare a route.
    ///
    /// An empty `path` binds this router's own prefix (or `/` at the root).
    pub fn on(
        &mut self,
        methods: impl Into<MethodSet>,
        path: &str,
        path_info: PathInfo,
        handler: impl Into<HandlerFactory>,
    ) -> RouteRef<'_> {
        let mut full = self.join(path);
        if full.is_empty() {
            full.push('/');
        }
        self.routes.push(RouteDecl {
            methods: methods.into(),
            path: full,
            path_info,
            handler: handler.into(),
            pausable: false,
            name: None,
        });
        let index = self.routes.len() - 1;
        RouteRef {
            decl: &mut self.routes[index],
        }
    }

    /// Declare a route answering to every method.
    pub fn route(&mut self, path: &str, handler: impl Into<HandlerFactory>) -> RouteRef<'_> {
        self.on(MethodSet::Any, path, PathInfo::None, handler)
    }

    pub fn get(&mut self, path: &str, handler: impl Into<HandlerFactory>) -> RouteRef<'_> {
        self.on(Method::GET, path, PathInfo::None, handler)
    }

    pub fn post(&mut self, path: &str, handler: impl Into<HandlerFactory>) -> RouteRef<'_> {
        self.on(Method::POST, path, PathInfo::None, handler)
    }

    pub fn put(&mut self, path: &str, handler: impl Into<HandlerFactory>) -> RouteRef<'_> {
        self.on(Method::PUT, path, PathInfo::None, handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl Into<HandlerFactory>) -> RouteRef<'_> {
        self.on(Method::DELETE, path, PathInfo::None, handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl Into<HandlerFactory>) -> RouteRef<'_> {
        self.on(Method::PATCH, path, PathInfo::None, handler)
    }

    /// Append a before-filter. Filters run in the order they were added.
    pub fn before(&mut self, filter: impl Element) -> &mut Self {
        self.before.push(Arc::new(filter));
        self
    }

    /// Append several before-filters at once.
    pub fn before_all<I>(&mut self, filters: I) -> &mut Self
    where
        I: IntoIterator<Item = Arc<dyn Element>>,
    {
        self.before.extend(filters);
        self
    }

    /// Append an after-filter. Filters run in the order they were added.
    pub fn after(&mut self, filter: impl Element) -> &mut Self {
        self.after.push(Arc::new(filter));
        self
    }

    /// Append several after-filters at once.
    pub fn after_all<I>(&mut self, filters: I) -> &mut Self
    where
        I: IntoIterator<Item = Arc<dyn Element>>,
    {
        self.after.extend(filters);
        self
    }

    /// Set this router's exception handler. A later call replaces an earlier one.
    pub fn exception(&mut self, handler: impl Element) -> &mut Self {
        if self.exception.is_some() {
            debug!(prefix = %self.prefix, "Exception handler replaced");
        }
        self.exception = Some(Arc::new(handler));
        self
    }

    /// Declare a child router under `prefix` and run `setup` on it.
    ///
    /// The child inherits this router's filters and exception handler. Its
    /// routes are tested after every route of this router, wherever in the
    /// setup code the group call appears.
    pub fn group<F>(&mut self, prefix: &str, setup: F) -> &mut Self
    where
        F: FnOnce(&mut RouterBuilder),
    {
        let mut child = RouterBuilder {
            prefix: self.join(prefix),
            routes: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            exception: None,
            children: Vec::new(),
            errors: Vec::new(),
        };
        setup(&mut child);
        self.children.push(child);
        self
    }

    /// Concatenate `path` onto this router's prefix, inserting a `/` if needed.
    fn join(&mut self, path: &str) -> String {
        if path.contains(['?', '#']) || path.chars().any(char::is_whitespace) {
            self.errors.push(SetupError::InvalidPath {
                path: path.to_string(),
                reason: "paths may not contain '?', '#' or whitespace".to_string(),
            });
        }
        let mut full = String::with_capacity(self.prefix.len() + path.len() + 1);
        full.push_str(&self.prefix);
        if !path.is_empty() && !path.starts_with('/') && !full.ends_with('/') {
            full.push('/');
        }
        full.push_str(path);
        full
    }

    /// Freeze the tree into an immutable [`Site`].
    pub fn build(self) -> Result<Site, SetupError> {
        let mut site = Site {
            nodes: Vec::new(),
            routes: Vec::new(),
            exact: HashMap::new(),
            patterned: Vec::new(),
            names: HashMap::new(),
        };
        freeze(self, None, &mut site)?;

        info!(
            routes_count = site.routes.len(),
            routers_count = site.nodes.len(),
            named_routes = site.names.len(),
            "Site built"
        );
        for route in &site.routes {
            debug!(route_id = route.id, route = %route, "Route registered");
        }
        Ok(site)
    }
}

fn freeze(
    builder: RouterBuilder,
    parent: Option<usize>,
    site: &mut Site,
) -> Result<usize, SetupError> {
    if let Some(err) = builder.errors.into_iter().next() {
        return Err(err);
    }

    let index = site.nodes.len();
    let (mut before, inherited_after, inherited_scope) = match parent.and_then(|p| site.nodes.get(p)) {
        Some(p) => (p.before.to_vec(), Arc::clone(&p.after), p.exception_scope),
        None => (Vec::new(), Arc::from(Vec::new()), None),
    };
    before.extend(builder.before);
    let mut after = builder.after;
    after.extend(inherited_after.iter().cloned());
    let exception_scope = if builder.exception.is_some() {
        Some(index)
    } else {
        inherited_scope
    };

    site.nodes.push(RouterNode {
        prefix: builder.prefix,
        parent,
        children: Vec::new(),
        before: Arc::from(before),
        after: Arc::from(after),
        exception: builder.exception,
        exception_scope,
    });

    for decl in builder.routes {
        let id = site.routes.len();
        if let Some(name) = &decl.name {
            if site.names.insert(name.clone(), id).is_some() {
                return Err(SetupError::DuplicateName { name: name.clone() });
            }
        }
        let route = Route {
            id,
            methods: decl.methods,
            path: decl.path,
            path_info: decl.path_info.compile()?,
            handler: decl.handler,
            router: index,
            pausable: decl.pausable,
            name: decl.name,
        };
        if route.is_exact() {
            site.exact.entry(route.path.clone()).or_default().push(id);
        } else {
            site.patterned.push(id);
        }
        site.routes.push(Arc::new(route));
    }

    for child in builder.children {
        let child_index = freeze(child, Some(index), site)?;
        if let Some(node) = site.nodes.get_mut(index) {
            node.children.push(child_index);
        }
    }
    Ok(index)
}

/// A frozen router node.
pub struct RouterNode {
    prefix: String,
    parent: Option<usize>,
    children: Vec<usize>,
    /// Effective before-filters, outermost router first
    before: FilterList,
    /// Effective after-filters, innermost router first
    after: FilterList,
    exception: Option<Arc<dyn Element>>,
    /// Nearest router (self or ancestor) with an exception handler
    exception_scope: Option<usize>,
}

impl RouterNode {
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Whether this node declared its own exception handler
    #[must_use]
    pub fn has_exception_handler(&self) -> bool {
        self.exception.is_some()
    }
}

/// The frozen router tree: every route in match order plus the router nodes
/// they belong to. Index 0 is the root.
pub struct Site {
    nodes: Vec<RouterNode>,
    routes: Vec<Arc<Route>>,
    /// Exact-path routes by full path, in declaration order
    exact: HashMap<String, SmallVec<[usize; 2]>>,
    /// Ids of `Capture`/`Map` routes, ascending
    patterned: Vec<usize>,
    names: HashMap<String, usize>,
}

impl Site {
    /// Resolve a request to the first matching route in declaration order.
    ///
    /// Exact-path routes are found through a hash index; only path-info
    /// routes declared before the best exact hit are scanned, so the result
    /// is the same as a full linear scan.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let start = Instant::now();

        let exact_hit = self.exact.get(path).and_then(|ids| {
            ids.iter()
                .copied()
                .find(|&id| self.route_allows(id, method))
        });
        let limit = exact_hit.unwrap_or(self.routes.len());

        let found = self
            .patterned
            .iter()
            .copied()
            .take_while(|&id| id < limit)
            .filter(|&id| self.route_allows(id, method))
            .find_map(|id| {
                let route = self.routes.get(id)?;
                route
                    .match_path(path)
                    .map(|(path_info, params)| (id, path_info, params))
            })
            .or_else(|| exact_hit.map(|id| (id, None, ParamVec::new())));

        let Some((id, path_info, path_params)) = found else {
            warn!(
                method = %method,
                path = %path,
                routes_checked = self.routes.len(),
                "No route matched"
            );
            return None;
        };
        let route = Arc::clone(self.routes.get(id)?);

        debug!(
            method = %method,
            path = %path,
            route_id = id,
            route_path = %route.path,
            path_info = ?path_info,
            path_params = ?path_params,
            duration_us = start.elapsed().as_micros() as u64,
            "Route matched"
        );

        Some(RouteMatch {
            route,
            path_info,
            path_params,
        })
    }

    fn route_allows(&self, id: usize, method: &Method) -> bool {
        self.routes
            .get(id)
            .is_some_and(|r| r.methods.contains(method))
    }

    /// All routes in match order
    #[must_use]
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    #[must_use]
    pub fn route(&self, id: usize) -> Option<&Arc<Route>> {
        self.routes.get(id)
    }

    #[must_use]
    pub fn node(&self, index: usize) -> Option<&RouterNode> {
        self.nodes.get(index)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Full path of a named route
    #[must_use]
    pub fn path_for(&self, name: &str) -> Option<&str> {
        let id = *self.names.get(name)?;
        self.routes.get(id).map(|r| r.path.as_str())
    }

    /// Effective before-filters of a router node, outermost first.
    #[must_use]
    pub fn before_filters(&self, router: usize) -> FilterList {
        self.nodes
            .get(router)
            .map(|n| Arc::clone(&n.before))
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Effective after-filters of a router node, innermost first.
    #[must_use]
    pub fn after_filters(&self, router: usize) -> FilterList {
        self.nodes
            .get(router)
            .map(|n| Arc::clone(&n.after))
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Nearest exception handler in scope for a router node.
    ///
    /// Returns the index of the router that declared it along with the handler.
    #[must_use]
    pub fn exception_handler(&self, router: usize) -> Option<(usize, Arc<dyn Element>)> {
        let scope = self.nodes.get(router)?.exception_scope?;
        let handler = self.nodes.get(scope)?.exception.as_ref()?;
        Some((scope, Arc::clone(handler)))
    }

    /// Router indices from `router` up to the root.
    #[must_use]
    pub fn ancestry(&self, router: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(router).map(|_| router);
        while let Some(index) = current {
            chain.push(index);
            current = self.nodes.get(index).and_then(|n| n.parent);
        }
        chain
    }

    /// One human-readable line per route, in match order.
    #[must_use]
    pub fn route_summaries(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|r| match &r.name {
                Some(name) => format!("{r} as {name}"),
                None => r.to_string(),
            })
            .collect()
    }
}

impl fmt::Debug for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Site")
            .field("routes", &self.routes)
            .field("routers", &self.nodes.len())
            .field("names", &self.names)
            .finish()
    }
}
