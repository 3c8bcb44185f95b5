//! Error types surfaced by route registration and request serving.
//!
//! Registration errors are programming errors: they are reported once, at
//! startup, and the application is expected to refuse to start. Routing misses
//! are not errors at all from the server's point of view, they become 404/405
//! responses.

use std::fmt;

/// Failure while registering a route, controller or filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A pattern segment could not be parsed.
    InvalidPattern {
        /// Full pattern as registered
        pattern: String,
        /// What is wrong with it
        reason: String,
    },
    /// A `:name(regex)` segment carries a regex that does not compile.
    InvalidRegex {
        /// Full pattern as registered
        pattern: String,
        /// Regex source inside the parentheses
        regex: String,
        /// Compiler message from the `regex` crate
        message: String,
    },
    /// A method token is not one of the known HTTP methods.
    UnknownMethod {
        /// The offending token as written
        method: String,
    },
    /// A method mapping clause is not of the form `methods:action`.
    InvalidMethodMapping {
        /// The clause as written
        mapping: String,
    },
    /// Two patterns disagree about what lives at the same trie position.
    Conflict {
        /// Pattern being inserted
        pattern: String,
        /// Zero-based segment index of the clash
        position: usize,
        /// Short description of the clash
        detail: String,
    },
    /// A controller was mapped to an action it does not provide.
    MissingAction {
        /// Controller type name
        controller: String,
        /// Action named in the mapping
        action: String,
    },
}

impl RegistrationError {
    pub(crate) fn invalid(pattern: &str, reason: impl Into<String>) -> Self {
        RegistrationError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::InvalidPattern { pattern, reason } => {
                write!(f, "invalid route pattern '{pattern}': {reason}")
            }
            RegistrationError::InvalidRegex {
                pattern,
                regex,
                message,
            } => write!(
                f,
                "invalid regex '{regex}' in route pattern '{pattern}': {message}"
            ),
            RegistrationError::UnknownMethod { method } => {
                write!(f, "unsupported http method '{method}'")
            }
            RegistrationError::InvalidMethodMapping { mapping } => write!(
                f,
                "method mapping '{mapping}' is invalid, expected 'method[,method]:action'"
            ),
            RegistrationError::Conflict {
                pattern,
                position,
                detail,
            } => write!(
                f,
                "route pattern '{pattern}' conflicts at segment {position}: {detail}"
            ),
            RegistrationError::MissingAction { controller, action } => {
                write!(f, "action '{action}' doesn't exist in controller {controller}")
            }
        }
    }
}

impl std::error::Error for RegistrationError {}
