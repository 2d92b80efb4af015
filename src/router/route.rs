use super::error::SetupError;
use super::pattern::PathInfoTemplate;
use super::ParamVec;
use crate::dispatcher::Element;
use http::Method;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Set of HTTP methods a route answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSet {
    /// Every method
    Any,
    /// Only the listed methods
    Only(SmallVec<[Method; 4]>),
}

impl MethodSet {
    /// Does this set admit `method`?
    #[inline]
    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        match self {
            MethodSet::Any => true,
            MethodSet::Only(methods) => methods.iter().any(|m| m == method),
        }
    }
}

impl From<Method> for MethodSet {
    fn from(method: Method) -> Self {
        let mut methods = SmallVec::new();
        methods.push(method);
        MethodSet::Only(methods)
    }
}

impl From<&[Method]> for MethodSet {
    fn from(methods: &[Method]) -> Self {
        MethodSet::Only(methods.iter().cloned().collect())
    }
}

impl<const N: usize> From<[Method; N]> for MethodSet {
    fn from(methods: [Method; N]) -> Self {
        MethodSet::Only(methods.into_iter().collect())
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSet::Any => f.write_str("*"),
            MethodSet::Only(methods) => {
                for (i, m) in methods.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    f.write_str(m.as_str())?;
                }
                Ok(())
            }
        }
    }
}

/// How the portion of the request path beyond a route's path is treated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PathInfo {
    /// The request path must equal the route path
    #[default]
    None,
    /// Any suffix after `path/` is captured as raw path-info
    Capture,
    /// The suffix must match one of these templates, in order
    Map(Vec<String>),
}

impl PathInfo {
    /// Convenience constructor for [`PathInfo::Map`].
    pub fn map<I, S>(templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PathInfo::Map(templates.into_iter().map(Into::into).collect())
    }

    pub(crate) fn compile(&self) -> Result<PathInfoMatcher, SetupError> {
        Ok(match self {
            PathInfo::None => PathInfoMatcher::None,
            PathInfo::Capture => PathInfoMatcher::Capture,
            PathInfo::Map(templates) => PathInfoMatcher::Map(
                templates
                    .iter()
                    .map(|t| PathInfoTemplate::parse(t))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }
}

/// Compiled form of [`PathInfo`] held by a frozen route.
#[derive(Debug, Clone)]
pub(crate) enum PathInfoMatcher {
    None,
    Capture,
    Map(Vec<PathInfoTemplate>),
}

/// Produces the handler element for each dispatch.
///
/// `Shared` hands every dispatch the same instance, so handler state is
/// shared across requests. `Fresh` builds a new instance per dispatch, which
/// gives each request (and each continuation) its own handler state.
#[derive(Clone)]
pub enum HandlerFactory {
    Shared(Arc<dyn Element>),
    Fresh(Arc<dyn Fn() -> Arc<dyn Element> + Send + Sync>),
}

impl HandlerFactory {
    #[must_use]
    pub fn shared(element: impl Element) -> Self {
        HandlerFactory::Shared(Arc::new(element))
    }

    #[must_use]
    pub fn fresh<F, E>(make: F) -> Self
    where
        F: Fn() -> E + Send + Sync + 'static,
        E: Element,
    {
        HandlerFactory::Fresh(Arc::new(move || Arc::new(make()) as Arc<dyn Element>))
    }

    /// Handler instance for one dispatch.
    #[must_use]
    pub fn create(&self) -> Arc<dyn Element> {
        match self {
            HandlerFactory::Shared(element) => Arc::clone(element),
            HandlerFactory::Fresh(make) => make(),
        }
    }
}

impl<E: Element> From<E> for HandlerFactory {
    fn from(element: E) -> Self {
        HandlerFactory::shared(element)
    }
}

impl fmt::Debug for HandlerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFactory::Shared(_) => f.write_str("HandlerFactory::Shared"),
            HandlerFactory::Fresh(_) => f.write_str("HandlerFactory::Fresh"),
        }
    }
}

/// A frozen route: methods, full path, path-info mode and handler.
///
/// Routes are immutable once the [`Site`](super::Site) is built.
pub struct Route {
    pub(crate) id: usize,
    pub(crate) methods: MethodSet,
    pub(crate) path: String,
    pub(crate) path_info: PathInfoMatcher,
    pub(crate) handler: HandlerFactory,
    pub(crate) router: usize,
    pub(crate) pausable: bool,
    pub(crate) name: Option<String>,
}

impl Route {
    /// Position in declaration (match) order
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn methods(&self) -> &MethodSet {
        &self.methods
    }

    /// Full path including every enclosing group prefix
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this route's pipeline runs on a continuation worker
    #[must_use]
    pub fn is_pausable(&self) -> bool {
        self.pausable
    }

    /// Index of the owning router node in the site
    #[must_use]
    pub fn router(&self) -> usize {
        self.router
    }

    /// Whether matching can be satisfied by a plain string compare
    pub(crate) fn is_exact(&self) -> bool {
        matches!(self.path_info, PathInfoMatcher::None)
    }

    /// Try to match `path`; returns `(path_info, params)` on success.
    pub(crate) fn match_path(&self, path: &str) -> Option<(Option<String>, ParamVec)> {
        match &self.path_info {
            PathInfoMatcher::None => (path == self.path).then(|| (None, ParamVec::new())),
            PathInfoMatcher::Capture => {
                let rest = self.path_info_of(path)?;
                Some((Some(rest.to_string()), ParamVec::new()))
            }
            PathInfoMatcher::Map(templates) => {
                let rest = self.path_info_of(path)?;
                templates
                    .iter()
                    .find_map(|t| t.matches(rest))
                    .map(|params| (Some(rest.to_string()), params))
            }
        }
    }

    /// The suffix of `path` beyond this route, without the separating `/`.
    fn path_info_of<'a>(&self, path: &'a str) -> Option<&'a str> {
        if path == self.path {
            return Some("");
        }
        let rest = path.strip_prefix(self.path.as_str())?;
        if self.path.ends_with('/') {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("methods", &self.methods)
            .field("path", &self.path)
            .field("path_info", &self.path_info)
            .field("router", &self.router)
            .field("pausable", &self.pausable)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.methods, self.path)?;
        match &self.path_info {
            PathInfoMatcher::None => {}
            PathInfoMatcher::Capture => f.write_str(" [path-info]")?,
            PathInfoMatcher::Map(templates) => {
                let sources: Vec<&str> = templates.iter().map(|t| t.source()).collect();
                write!(f, " [{}]", sources.join(", "))?;
            }
        }
        if self.pausable {
            f.write_str(" (pausable)")?;
        }
        Ok(())
    }
}
