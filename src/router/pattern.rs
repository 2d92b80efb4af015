//! Structured path-info templates for [`PathInfo::Map`](super::PathInfo::Map).
//!
//! A template is a `/`-separated list of segments. Each segment is either a
//! literal (`archive`), a named single-segment wildcard (`{slug}`), a named
//! segment constrained by a regular expression (`{year:\d{4}}`), or a mix of
//! literal text and parameters inside one segment (`v{major}.{minor}`).
//!
//! Matching is evaluated segment by segment, left to right. A segment either
//! matches in full or the template fails; there is no backtracking across
//! segment boundaries, so the request must have exactly as many segments as
//! the template.

use super::error::SetupError;
use super::ParamVec;
use regex::Regex;
use std::sync::Arc;

/// One compiled segment of a template.
#[derive(Debug, Clone)]
enum Segment {
    /// Must equal the request segment exactly
    Literal(String),
    /// `{name}`: any non-empty segment
    Param(Arc<str>),
    /// Anything else: compiled to an anchored regex with named groups `p0..pN`
    Pattern {
        regex: Regex,
        params: Vec<Arc<str>>,
    },
}

/// A compiled path-info template.
#[derive(Debug, Clone)]
pub struct PathInfoTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathInfoTemplate {
    /// Compile a template. A single leading `/` is ignored.
    pub fn parse(template: &str) -> Result<Self, SetupError> {
        let body = template.strip_prefix('/').unwrap_or(template);
        let mut segments = Vec::new();
        if !body.is_empty() {
            for raw in split_top_level(template, body)? {
                segments.push(compile_segment(template, &raw)?);
            }
        }
        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// The template as written at setup time.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of all parameters bound by this template, in order.
    #[must_use]
    pub fn param_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(_) => {}
                Segment::Param(name) => names.push(name.as_ref()),
                Segment::Pattern { params, .. } => {
                    names.extend(params.iter().map(|p| p.as_ref()));
                }
            }
        }
        names
    }

    /// Match a path-info string (without its leading `/`).
    ///
    /// Returns the bound parameters when every segment matches.
    #[must_use]
    pub fn matches(&self, path_info: &str) -> Option<ParamVec> {
        if self.segments.is_empty() {
            return path_info.is_empty().then(ParamVec::new);
        }
        if path_info.is_empty() {
            return None;
        }

        let mut params = ParamVec::new();
        let mut parts = path_info.split('/');
        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.push((Arc::clone(name), part.to_string()));
                }
                Segment::Pattern { regex, params: names } => {
                    let caps = regex.captures(part)?;
                    for (i, name) in names.iter().enumerate() {
                        let value = caps.name(&format!("p{i}"))?.as_str();
                        params.push((Arc::clone(name), value.to_string()));
                    }
                }
            }
        }
        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

/// Split on `/` outside of `{...}` so regex quantifiers like `\d{4}` survive.
fn split_top_level(template: &str, body: &str) -> Result<Vec<String>, SetupError> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                if depth == 0 {
                    return Err(malformed(template, "unbalanced '}'"));
                }
                depth -= 1;
                current.push(c);
            }
            '/' if depth == 0 => out.push(std::mem::take(&mut current)),
            '/' => {
                return Err(malformed(
                    template,
                    "a parameter cannot span more than one segment",
                ))
            }
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return Err(malformed(template, "unbalanced '{'"));
    }
    out.push(current);
    Ok(out)
}

fn compile_segment(template: &str, raw: &str) -> Result<Segment, SetupError> {
    if !raw.contains('{') {
        return Ok(Segment::Literal(raw.to_string()));
    }

    // Fast path: the whole segment is a plain `{name}`
    if let Some(inner) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        if !inner.contains(['{', '}', ':']) {
            return Ok(Segment::Param(Arc::from(validate_name(template, inner)?)));
        }
    }

    let mut pattern = String::with_capacity(raw.len() + 16);
    pattern.push('^');
    let mut params = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '{' {
            literal.push(c);
            continue;
        }
        pattern.push_str(&regex::escape(&literal));
        literal.clear();

        let mut depth = 1usize;
        let mut inner = String::new();
        for c in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            inner.push(c);
        }

        let (name, constraint) = match inner.split_once(':') {
            Some((name, re)) => (name, Some(re)),
            None => (inner.as_str(), None),
        };
        let name = validate_name(template, name)?;
        let group = format!("p{}", params.len());
        match constraint {
            Some(re) => {
                Regex::new(re).map_err(|e| SetupError::InvalidConstraint {
                    template: template.to_string(),
                    param: name.to_string(),
                    reason: e.to_string(),
                })?;
                pattern.push_str(&format!("(?P<{group}>{re})"));
            }
            None => pattern.push_str(&format!("(?P<{group}>[^/]+?)")),
        }
        params.push(Arc::from(name));
    }
    pattern.push_str(&regex::escape(&literal));
    pattern.push('$');

    let regex = Regex::new(&pattern).map_err(|e| SetupError::InvalidConstraint {
        template: template.to_string(),
        param: params
            .last()
            .map(|p: &Arc<str>| p.to_string())
            .unwrap_or_default(),
        reason: e.to_string(),
    })?;
    Ok(Segment::Pattern { regex, params })
}

fn validate_name<'a>(template: &str, name: &'a str) -> Result<&'a str, SetupError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(name)
    } else {
        Err(malformed(
            template,
            &format!("invalid parameter name '{name}'"),
        ))
    }
}

fn malformed(template: &str, reason: &str) -> SetupError {
    SetupError::MalformedTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}
