//! Known HTTP methods and method-mapping specs.
//!
//! A mapping spec binds HTTP methods to controller actions:
//!
//! ```text
//! "get:List"              GET  -> List
//! "get,post:Save"         GET  -> Save, POST -> Save
//! "get:List;post:Create"  GET  -> List, POST -> Create
//! "*:Any"                 every method -> Any
//! ```

use http::Method;

use crate::error::RegistrationError;

/// Methods the dispatcher accepts. Anything else is answered with 405.
pub const KNOWN_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "HEAD", "TRACE", "CONNECT", "MKCOL",
    "COPY", "MOVE", "PROPFIND", "LOCK", "UNLOCK",
];

/// Iterate every known method as an [`http::Method`].
pub fn known_methods() -> impl Iterator<Item = Method> {
    KNOWN_METHODS
        .iter()
        .filter_map(|m| Method::from_bytes(m.as_bytes()).ok())
}

/// Whether `method` belongs to [`KNOWN_METHODS`].
#[must_use]
pub fn is_known(method: &Method) -> bool {
    KNOWN_METHODS.contains(&method.as_str())
}

/// Left-hand side of a mapping clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodSel {
    /// `*`: every method not mapped explicitly
    Any,
    /// One concrete method
    Exact(Method),
}

/// Parse a single method token (case-insensitive). `*` yields [`MethodSel::Any`].
pub fn parse_method(token: &str) -> Result<MethodSel, RegistrationError> {
    let token = token.trim();
    if token == "*" {
        return Ok(MethodSel::Any);
    }
    let upper = token.to_ascii_uppercase();
    if !KNOWN_METHODS.contains(&upper.as_str()) {
        return Err(RegistrationError::UnknownMethod {
            method: token.to_string(),
        });
    }
    Method::from_bytes(upper.as_bytes())
        .map(MethodSel::Exact)
        .map_err(|_| RegistrationError::UnknownMethod {
            method: token.to_string(),
        })
}

/// Parse a comma separated method list such as `"get,post"` or `"*"`.
pub fn parse_method_list(list: &str) -> Result<Vec<MethodSel>, RegistrationError> {
    if list.trim().is_empty() {
        return Ok(vec![MethodSel::Any]);
    }
    list.split(',').map(parse_method).collect()
}

/// Parse a full mapping spec into `(selector, action)` pairs in clause order.
pub fn parse_mapping(spec: &str) -> Result<Vec<(MethodSel, String)>, RegistrationError> {
    let mut out = Vec::new();
    for clause in spec.split(';').filter(|c| !c.trim().is_empty()) {
        let mut parts = clause.split(':');
        let (methods, action) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(a), None) if !a.trim().is_empty() => (m, a.trim()),
            _ => {
                return Err(RegistrationError::InvalidMethodMapping {
                    mapping: clause.to_string(),
                })
            }
        };
        for sel in parse_method_list(methods)? {
            out.push((sel, action.to_string()));
        }
    }
    if out.is_empty() {
        return Err(RegistrationError::InvalidMethodMapping {
            mapping: spec.to_string(),
        });
    }
    Ok(out)
}

/// Expand selectors to the concrete methods whose trees receive the route.
#[must_use]
pub fn expand(sels: &[MethodSel]) -> Vec<Method> {
    if sels.iter().any(|s| *s == MethodSel::Any) {
        return known_methods().collect();
    }
    let mut out: Vec<Method> = Vec::with_capacity(sels.len());
    for sel in sels {
        if let MethodSel::Exact(m) = sel {
            if !out.contains(m) {
                out.push(m.clone());
            }
        }
    }
    out
}

/// Methods reached only through `*`: every known method not named exactly.
#[must_use]
pub fn fallback_methods(sels: &[MethodSel]) -> Vec<Method> {
    if !sels.iter().any(|s| *s == MethodSel::Any) {
        return Vec::new();
    }
    known_methods()
        .filter(|m| !sels.iter().any(|s| matches!(s, MethodSel::Exact(e) if e == m)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_methods_cover_webdav() {
        let all: Vec<Method> = known_methods().collect();
        assert_eq!(all.len(), KNOWN_METHODS.len());
        assert!(all.iter().any(|m| m.as_str() == "PROPFIND"));
    }

    #[test]
    fn test_parse_mapping_forms() {
        let m = parse_mapping("get:List;post:Create").unwrap();
        assert_eq!(
            m,
            vec![
                (MethodSel::Exact(Method::GET), "List".to_string()),
                (MethodSel::Exact(Method::POST), "Create".to_string()),
            ]
        );

        let m = parse_mapping("get,post:Save").unwrap();
        assert_eq!(m.len(), 2);
        assert!(m.iter().all(|(_, a)| a == "Save"));

        let m = parse_mapping("*:Any").unwrap();
        assert_eq!(m, vec![(MethodSel::Any, "Any".to_string())]);

        let m = parse_mapping(":List").unwrap();
        assert_eq!(m, vec![(MethodSel::Any, "List".to_string())]);
    }

    #[test]
    fn test_fallback_methods_exclude_exact_ones() {
        let sels = parse_method_list("get,*").unwrap();
        let fallback = fallback_methods(&sels);
        assert!(!fallback.contains(&Method::GET));
        assert!(fallback.contains(&Method::POST));
        assert_eq!(fallback.len(), KNOWN_METHODS.len() - 1);

        assert!(fallback_methods(&parse_method_list("get,post").unwrap()).is_empty());
        assert_eq!(
            fallback_methods(&parse_method_list("").unwrap()).len(),
            KNOWN_METHODS.len()
        );
    }

    #[test]
    fn test_parse_mapping_rejects_bad_input() {
        assert!(matches!(
            parse_mapping("get"),
            Err(RegistrationError::InvalidMethodMapping { .. })
        ));
        assert!(matches!(
            parse_mapping("get:a:b"),
            Err(RegistrationError::InvalidMethodMapping { .. })
        ));
        assert_eq!(
            parse_mapping("fetch:List"),
            Err(RegistrationError::UnknownMethod {
                method: "fetch".to_string()
            })
        );
    }

    #[test]
    fn test_expand_star_and_dedup() {
        assert_eq!(expand(&[MethodSel::Any]).len(), KNOWN_METHODS.len());
        let sels = vec![
            MethodSel::Exact(Method::GET),
            MethodSel::Exact(Method::GET),
            MethodSel::Exact(Method::PUT),
        ];
        assert_eq!(expand(&sels), vec![Method::GET, Method::PUT]);
    }
}
