//! Route pattern grammar.
//!
//! Patterns are parsed and their regex constraints compiled exactly once, at
//! registration. Everything that can be wrong with a pattern is reported here,
//! so the matcher never has to fail.

use regex::Regex;
use std::fmt;
use std::sync::Arc;

use crate::error::RegistrationError;

/// Shorthand constraint for `:name:int`.
const INT_CONSTRAINT: &str = "[0-9]+";
/// Shorthand constraint for `:name:string`.
const STRING_CONSTRAINT: &str = r"[\w]+";

/// Options shared by pattern parsing and path matching.
///
/// Both sides of a tree must agree on them, so a [`super::Tree`] carries the
/// options it was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    /// Compare literal segments case-sensitively (default `true`)
    pub case_sensitive: bool,
    /// Treat `/a/` and `/a` as different paths (default `false`)
    pub strict_slash: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            strict_slash: false,
        }
    }
}

/// Split a request path or pattern into segments.
///
/// The leading slash is dropped. Unless `strict_slash` is set, one trailing
/// slash is dropped too, which makes `/a/` and `/a` equivalent.
pub(crate) fn split_path(path: &str, strict_slash: bool) -> impl Iterator<Item = &str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = if strict_slash {
        trimmed
    } else {
        trimmed.strip_suffix('/').unwrap_or(trimmed)
    };
    let empty = trimmed.is_empty();
    trimmed.split('/').filter(move |_| !empty)
}

/// Compiled regex constraint of a `:name(regex)` segment.
#[derive(Clone)]
pub struct Constraint {
    source: Arc<str>,
    regex: Regex,
}

impl Constraint {
    fn compile(pattern: &str, source: &str) -> Result<Self, RegistrationError> {
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| {
            RegistrationError::InvalidRegex {
                pattern: pattern.to_string(),
                regex: source.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            source: Arc::from(source),
            regex,
        })
    }

    /// Regex source as written in the pattern.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether a whole path segment satisfies the constraint.
    #[inline]
    #[must_use]
    pub fn is_match(&self, segment: &str) -> bool {
        self.regex.is_match(segment)
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Constraint {}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Constraint").field(&self.source).finish()
    }
}

/// Flavours of the remainder-consuming wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardKind {
    /// `*`: remainder captured as `splat`, possibly empty
    Splat,
    /// `*.*`: remainder split at its last dot into `path` and `ext`
    PathExt,
    /// `*.json`: remainder must end in `.json`, the rest is captured as `path`
    Ext(String),
}

impl WildcardKind {
    pub(crate) fn capture_names(&self) -> &'static [&'static str] {
        match self {
            WildcardKind::Splat => &["splat"],
            WildcardKind::PathExt => &["path", "ext"],
            WildcardKind::Ext(_) => &["path"],
        }
    }

    /// Capture values for a non-empty remainder, or `None` when it doesn't fit.
    pub(crate) fn capture(&self, remainder: &str) -> Option<[Option<String>; 2]> {
        match self {
            WildcardKind::Splat => Some([Some(remainder.to_string()), None]),
            WildcardKind::PathExt => {
                let last = remainder.rsplit('/').next().unwrap_or(remainder);
                let (_, ext) = last.rsplit_once('.')?;
                let path = &remainder[..remainder.len() - ext.len() - 1];
                if path.is_empty() || ext.is_empty() {
                    return None;
                }
                Some([Some(path.to_string()), Some(ext.to_string())])
            }
            WildcardKind::Ext(ext) => {
                let path = remainder.strip_suffix(ext.as_str())?.strip_suffix('.')?;
                if path.is_empty() {
                    return None;
                }
                Some([Some(path.to_string()), None])
            }
        }
    }
}

/// One parsed pattern segment.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Exact text
    Literal(String),
    /// `:name`, `:name(regex)`, `:name:int`, `?:name`
    Param {
        name: Arc<str>,
        constraint: Option<Constraint>,
        optional: bool,
    },
    /// `*`, `*.*`, `*.ext`
    Wildcard(WildcardKind),
}

/// A route or filter pattern, parsed and compiled.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: Arc<str>,
    segments: Vec<Segment>,
    param_names: Vec<Arc<str>>,
}

impl Pattern {
    /// Parse `raw` under `opts`.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::InvalidPattern`] for grammar violations and
    /// [`RegistrationError::InvalidRegex`] for constraints that don't compile.
    pub fn parse(raw: &str, opts: TreeOptions) -> Result<Self, RegistrationError> {
        if !raw.starts_with('/') {
            return Err(RegistrationError::invalid(raw, "pattern must start with '/'"));
        }

        let parts: Vec<&str> = split_path(raw, opts.strict_slash).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut param_names = Vec::new();

        for (idx, part) in parts.iter().enumerate() {
            let is_last = idx + 1 == parts.len();
            let segment = parse_segment(raw, part, opts)?;
            match &segment {
                Segment::Param { name, optional, .. } => {
                    if *optional && !is_last {
                        return Err(RegistrationError::invalid(
                            raw,
                            format!("optional segment '{part}' must be the last segment"),
                        ));
                    }
                    param_names.push(Arc::clone(name));
                }
                Segment::Wildcard(kind) => {
                    if !is_last {
                        return Err(RegistrationError::invalid(
                            raw,
                            format!("wildcard '{part}' must be the last segment"),
                        ));
                    }
                    param_names.extend(kind.capture_names().iter().map(|n| Arc::from(*n)));
                }
                Segment::Literal(_) => {}
            }
            segments.push(segment);
        }

        Ok(Self {
            raw: Arc::from(raw),
            segments,
            param_names,
        })
    }

    /// The pattern exactly as registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub(crate) fn raw(&self) -> &Arc<str> {
        &self.raw
    }

    /// Parsed segments in path order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Capture names in the order values are extracted.
    #[must_use]
    pub fn param_names(&self) -> &[Arc<str>] {
        &self.param_names
    }

    /// Whether the last segment is an optional parameter.
    #[must_use]
    pub fn has_optional_tail(&self) -> bool {
        matches!(
            self.segments.last(),
            Some(Segment::Param { optional: true, .. })
        )
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_segment(raw: &str, part: &str, opts: TreeOptions) -> Result<Segment, RegistrationError> {
    if let Some(rest) = part.strip_prefix('*') {
        let kind = match rest {
            "" => WildcardKind::Splat,
            ".*" => WildcardKind::PathExt,
            ext => match ext.strip_prefix('.') {
                Some(e) if valid_name(e) => WildcardKind::Ext(e.to_string()),
                _ => {
                    return Err(RegistrationError::invalid(
                        raw,
                        format!("unsupported wildcard '{part}'"),
                    ))
                }
            },
        };
        return Ok(Segment::Wildcard(kind));
    }

    let (optional, body) = match part.strip_prefix("?:") {
        Some(body) => (true, Some(body)),
        None => (false, part.strip_prefix(':')),
    };

    let Some(body) = body else {
        if part.contains([':', '*', '(', ')']) {
            return Err(RegistrationError::invalid(
                raw,
                format!("segment '{part}' embeds a parameter, which is not supported"),
            ));
        }
        let literal = if opts.case_sensitive {
            part.to_string()
        } else {
            part.to_lowercase()
        };
        return Ok(Segment::Literal(literal));
    };

    let name_end = body.find([':', '(']).unwrap_or(body.len());
    let (name, tail) = body.split_at(name_end);
    if !valid_name(name) {
        return Err(RegistrationError::invalid(
            raw,
            format!("parameter name in '{part}' must be non-empty [A-Za-z0-9_]"),
        ));
    }

    let constraint = match tail {
        "" => None,
        ":int" => Some(Constraint::compile(raw, INT_CONSTRAINT)?),
        ":string" => Some(Constraint::compile(raw, STRING_CONSTRAINT)?),
        t if t.starts_with('(') => {
            let source = t
                .strip_prefix('(')
                .and_then(|s| s.strip_suffix(')'))
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    RegistrationError::invalid(raw, format!("unbalanced regex in '{part}'"))
                })?;
            Some(Constraint::compile(raw, source)?)
        }
        _ => {
            return Err(RegistrationError::invalid(
                raw,
                format!("unknown parameter suffix in '{part}'"),
            ))
        }
    };

    Ok(Segment::Param {
        name: Arc::from(name),
        constraint,
        optional,
    })
}
