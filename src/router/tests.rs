use super::*;
use http::Method;
use std::sync::Arc;

fn opts() -> TreeOptions {
    TreeOptions::default()
}

fn entry(pattern: &str) -> Arc<RouteEntry> {
    Arc::new(RouteEntry::new(
        Pattern::parse(pattern, opts()).unwrap(),
        vec![Method::GET],
        DispatchTarget::function(|_| {}),
    ))
}

fn route_match(pattern: &str, path: &str) -> RouteMatch {
    let e = entry(pattern);
    let mut tree: Tree<RouteEntry> = Tree::new(opts());
    tree.insert(e.pattern(), Arc::clone(&e)).unwrap();
    let m = tree.find(path).unwrap();
    RouteMatch {
        entry: Arc::clone(m.value),
        path_params: m.params,
    }
}

#[test]
fn test_root_path() {
    let m = route_match("/", "/");
    assert_eq!(m.entry.pattern().as_str(), "/");
    assert!(m.path_params.is_empty());
}

#[test]
fn test_nested_params_in_order() {
    let m = route_match("/a/:b/c/:d", "/a/1/c/2");
    let names: Vec<&str> = m.path_params.iter().map(|(k, _)| k.as_ref()).collect();
    assert_eq!(names, vec!["b", "d"]);
    assert_eq!(m.get_path_param("d"), Some("2"));
    assert_eq!(m.get_path_param("missing"), None);
    assert_eq!(m.path_params_map().get("b").map(String::as_str), Some("1"));
}

#[test]
fn test_repeated_name_last_wins() {
    let m = route_match("/:x/:x", "/first/second");
    assert_eq!(m.path_params.len(), 2);
    assert_eq!(m.get_path_param("x"), Some("second"));
}

#[test]
fn test_params_are_not_decoded() {
    let m = route_match("/files/:name", "/files/a%20b");
    assert_eq!(m.get_path_param("name"), Some("a%20b"));
}

#[test]
fn test_int_shorthand_rejects_non_digits() {
    let mut tree: Tree<&str> = Tree::new(opts());
    tree.insert(&Pattern::parse("/users/:id:int", opts()).unwrap(), Arc::new("user"))
        .unwrap();
    assert!(tree.matches("/users/12"));
    assert!(!tree.matches("/users/bob"));
    assert!(!tree.matches("/users/"));
}

#[test]
fn test_same_pattern_replaces_value() {
    let mut tree: Tree<&str> = Tree::new(opts());
    let p = Pattern::parse("/x/:id", opts()).unwrap();
    tree.insert(&p, Arc::new("old")).unwrap();
    tree.insert(&p, Arc::new("new")).unwrap();
    assert_eq!(**tree.find("/x/1").unwrap().value, "new");
    assert_eq!(tree.patterns().len(), 1);
}

#[test]
fn test_first_registered_wins_for_equivalent_structure() {
    let mut tree: Tree<&str> = Tree::new(opts());
    tree.insert(&Pattern::parse("/x/:a", opts()).unwrap(), Arc::new("a"))
        .unwrap();
    tree.insert(&Pattern::parse("/x/:b", opts()).unwrap(), Arc::new("b"))
        .unwrap();
    let m = tree.find("/x/1").unwrap();
    assert_eq!(**m.value, "a");
    assert_eq!(m.params[0].0.as_ref(), "a");
}

#[test]
fn test_wildcard_kind_conflict() {
    let mut tree: Tree<()> = Tree::new(opts());
    tree.insert(&Pattern::parse("/f/*", opts()).unwrap(), Arc::new(()))
        .unwrap();
    let err = tree
        .insert(&Pattern::parse("/f/*.*", opts()).unwrap(), Arc::new(()))
        .unwrap_err();
    assert!(matches!(err, crate::RegistrationError::Conflict { position: 1, .. }));
}

#[test]
fn test_route_miss_status() {
    assert_eq!(RouteMiss::NotFound.status(), 404);
    let miss = RouteMiss::MethodNotAllowed {
        allow: vec![Method::GET],
    };
    assert_eq!(miss.status(), 405);
    assert_eq!(miss.to_string(), "Method Not Allowed");
}

#[test]
fn test_dispatch_target_kind() {
    assert_eq!(DispatchTarget::function(|_| {}).kind(), "function");
    assert_eq!(DispatchTarget::raw(|_, _| {}).kind(), "raw");
    assert_eq!(format!("{:?}", DispatchTarget::raw(|_, _| {})), "raw");
}

#[test]
fn test_empty_tree() {
    let tree: Tree<()> = Tree::default();
    assert!(tree.is_empty());
    assert!(tree.find("/").is_none());
    assert!(tree.patterns().is_empty());
}
