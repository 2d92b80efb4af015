use std::fmt;

/// Router setup error
///
/// Returned by [`RouterBuilder::build`](super::RouterBuilder::build) when a
/// declaration made during setup cannot be compiled. Setup errors are fatal:
/// a [`Site`](super::Site) is never built from an invalid tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// A path-info template could not be parsed
    MalformedTemplate {
        /// The offending template
        template: String,
        /// What is wrong with it
        reason: String,
    },
    /// A `{name:regex}` constraint is not a valid regular expression
    InvalidConstraint {
        /// The offending template
        template: String,
        /// Parameter the constraint belongs to
        param: String,
        /// Error reported by the regex compiler
        reason: String,
    },
    /// A route or group path contains characters that can never match
    InvalidPath {
        /// The offending path
        path: String,
        /// What is wrong with it
        reason: String,
    },
    /// Two routes were given the same name
    DuplicateName {
        /// The repeated route name
        name: String,
    },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::MalformedTemplate { template, reason } => {
                write!(f, "malformed path-info template '{template}': {reason}")
            }
            SetupError::InvalidConstraint {
                template,
                param,
                reason,
            } => write!(
                f,
                "invalid regex constraint for '{param}' in path-info template '{template}': {reason}"
            ),
            SetupError::InvalidPath { path, reason } => {
                write!(f, "invalid route path '{path}': {reason}")
            }
            SetupError::DuplicateName { name } => {
                write!(f, "route name '{name}' is declared more than once")
            }
        }
    }
}

impl std::error::Error for SetupError {}
