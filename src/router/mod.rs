//! # Router Module
//!
//! Scoped router trees and request-path resolution.
//!
//! ## Overview
//!
//! A site is declared once through a [`RouterBuilder`]: routes bound to
//! paths, nested groups with their own prefixes, and per-router before
//! filters, after filters and an exception handler. [`RouterBuilder::build`]
//! freezes the tree into a [`Site`], which is read-only from then on.
//!
//! ## Matching
//!
//! Routes are tested in declaration order (a router's own routes before its
//! child groups) and the first match wins. Each route selects how the part
//! of the path beyond it is treated:
//!
//! - [`PathInfo::None`]: the request path must equal the route path
//! - [`PathInfo::Capture`]: the route path and anything below it matches; the
//!   remainder is exposed as raw path-info
//! - [`PathInfo::Map`]: the remainder must match one of the given templates,
//!   whose `{name}` and `{name:regex}` segments become path parameters
//!
//! ## Example
//!
//! ```rust,ignore
//! use brrtengine::dispatcher::element;
//! use brrtengine::router::{PathInfo, RouterBuilder};
//!
//! let mut root = RouterBuilder::new();
//! root.get("/", element(|ctx| { ctx.print("home"); Ok(()) }));
//! root.group("/blog", |blog| {
//!     blog.on(http::Method::GET, "", PathInfo::map([r"{year:\d{4}}/{slug}"]),
//!         element(|ctx| { ctx.print(ctx.path_param("slug").unwrap_or("")); Ok(()) }));
//! });
//! let site = root.build()?;
//! ```

mod core;
mod error;
mod pattern;
mod route;
#[cfg(test)]
mod tests;

pub use core::{
    FilterList, ParamVec, RouteMatch, RouteRef, RouterBuilder, RouterNode, Site,
    MAX_INLINE_PARAMS,
};
pub use error::SetupError;
pub use pattern::PathInfoTemplate;
pub use route::{HandlerFactory, MethodSet, PathInfo, Route};
