//! Segment trie used for both routes and filter scopes.
//!
//! ## Layout
//!
//! Every node owns:
//! - literal children, keyed by exact segment text (O(1) lookup)
//! - at most one parameter child (`:name`, optionally regex-constrained)
//! - at most one wildcard edge (`*`, `*.*`, `*.ext`), always terminal
//! - the leaves of patterns ending at this node
//!
//! Parameter names are not stored on nodes. `/users/:id/posts` and
//! `/users/:uid/comments` share the parameter node, and each leaf carries the
//! names of its own captures.
//!
//! ## Precedence
//!
//! Matching tries literal, then parameter, then wildcard, and backtracks when a
//! more specific branch dead-ends deeper down. A literal route always wins over
//! a catch-all regardless of registration order.
//!
//! ## Copy-on-write
//!
//! Children are `Arc<Node>`. Cloning a tree is O(1) and mutation goes through
//! `Arc::make_mut`, which copies only the nodes on the mutated path. A reader
//! holding an older snapshot keeps seeing it intact.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use super::core::ParamVec;
use super::pattern::{split_path, Constraint, Pattern, Segment, TreeOptions, WildcardKind};
use crate::error::RegistrationError;

type Captures = SmallVec<[String; 8]>;

struct Leaf<T> {
    pattern: Arc<str>,
    names: Arc<[Arc<str>]>,
    value: Arc<T>,
}

impl<T> Clone for Leaf<T> {
    fn clone(&self) -> Self {
        Self {
            pattern: Arc::clone(&self.pattern),
            names: Arc::clone(&self.names),
            value: Arc::clone(&self.value),
        }
    }
}

struct ParamEdge<T> {
    constraint: Option<Constraint>,
    node: Arc<Node<T>>,
}

impl<T> Clone for ParamEdge<T> {
    fn clone(&self) -> Self {
        Self {
            constraint: self.constraint.clone(),
            node: Arc::clone(&self.node),
        }
    }
}

struct WildEdge<T> {
    kind: WildcardKind,
    leaves: Vec<Leaf<T>>,
}

impl<T> Clone for WildEdge<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            leaves: self.leaves.clone(),
        }
    }
}

struct Node<T> {
    statics: HashMap<String, Arc<Node<T>>>,
    param: Option<ParamEdge<T>>,
    wildcard: Option<WildEdge<T>>,
    leaves: Vec<Leaf<T>>,
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self {
            statics: self.statics.clone(),
            param: self.param.clone(),
            wildcard: self.wildcard.clone(),
            leaves: self.leaves.clone(),
        }
    }
}

fn push_leaf<T>(leaves: &mut Vec<Leaf<T>>, leaf: Leaf<T>) {
    // Re-registering the same pattern string replaces the earlier leaf
    match leaves.iter_mut().find(|l| l.pattern == leaf.pattern) {
        Some(slot) => *slot = leaf,
        None => leaves.push(leaf),
    }
}

fn leaf_value<'a, T>(leaves: &'a [Leaf<T>], pattern: &str) -> Option<&'a Arc<T>> {
    leaves.iter().find(|l| &*l.pattern == pattern).map(|l| &l.value)
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            statics: HashMap::new(),
            param: None,
            wildcard: None,
            leaves: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.statics.is_empty()
            && self.param.is_none()
            && self.wildcard.is_none()
            && self.leaves.is_empty()
    }

    /// Read-only pass rejecting structural ambiguity before anything is mutated.
    fn check(&self, segs: &[Segment], pattern: &str, depth: usize) -> Result<(), RegistrationError> {
        let Some((seg, rest)) = segs.split_first() else {
            return Ok(());
        };
        match seg {
            Segment::Literal(text) => match self.statics.get(text) {
                Some(child) => child.check(rest, pattern, depth + 1),
                None => Ok(()),
            },
            Segment::Param { constraint, .. } => match &self.param {
                Some(edge) if edge.constraint != *constraint => Err(RegistrationError::Conflict {
                    pattern: pattern.to_string(),
                    position: depth,
                    detail: format!(
                        "parameter constraint {} clashes with existing {}",
                        describe(constraint.as_ref()),
                        describe(edge.constraint.as_ref())
                    ),
                }),
                Some(edge) => edge.node.check(rest, pattern, depth + 1),
                None => Ok(()),
            },
            Segment::Wildcard(kind) => match &self.wildcard {
                Some(edge) if edge.kind != *kind => Err(RegistrationError::Conflict {
                    pattern: pattern.to_string(),
                    position: depth,
                    detail: format!("wildcard {kind:?} clashes with existing {:?}", edge.kind),
                }),
                _ => Ok(()),
            },
        }
    }

    fn insert(&mut self, segs: &[Segment], leaf: Leaf<T>) {
        let Some((seg, rest)) = segs.split_first() else {
            push_leaf(&mut self.leaves, leaf);
            return;
        };
        match seg {
            Segment::Literal(text) => {
                let child = self
                    .statics
                    .entry(text.clone())
                    .or_insert_with(|| Arc::new(Node::new()));
                Arc::make_mut(child).insert(rest, leaf);
            }
            Segment::Param { constraint, .. } => {
                let edge = self.param.get_or_insert_with(|| ParamEdge {
                    constraint: constraint.clone(),
                    node: Arc::new(Node::new()),
                });
                Arc::make_mut(&mut edge.node).insert(rest, leaf);
            }
            Segment::Wildcard(kind) => {
                let edge = self.wildcard.get_or_insert_with(|| WildEdge {
                    kind: kind.clone(),
                    leaves: Vec::new(),
                });
                push_leaf(&mut edge.leaves, leaf);
            }
        }
    }

    fn lookup(&self, segs: &[Segment], pattern: &str) -> Option<&Arc<T>> {
        let Some((seg, rest)) = segs.split_first() else {
            return leaf_value(&self.leaves, pattern);
        };
        match seg {
            Segment::Literal(text) => self.statics.get(text)?.lookup(rest, pattern),
            Segment::Param { .. } => self.param.as_ref()?.node.lookup(rest, pattern),
            Segment::Wildcard(_) => leaf_value(&self.wildcard.as_ref()?.leaves, pattern),
        }
    }

    fn contains(&self, segs: &[Segment], pattern: &str) -> bool {
        self.lookup(segs, pattern).is_some()
    }

    /// Detach leaves for `pattern` along `segs`, pruning nodes left empty.
    /// Callers check [`Node::contains`] first so untouched paths aren't copied.
    fn remove(&mut self, segs: &[Segment], pattern: &str) -> usize {
        let Some((seg, rest)) = segs.split_first() else {
            let before = self.leaves.len();
            self.leaves.retain(|l| &*l.pattern != pattern);
            return before - self.leaves.len();
        };
        match seg {
            Segment::Literal(text) => {
                let Some(child) = self.statics.get_mut(text) else {
                    return 0;
                };
                let removed = Arc::make_mut(child).remove(rest, pattern);
                if child.is_empty() {
                    self.statics.remove(text);
                }
                removed
            }
            Segment::Param { .. } => {
                let Some(edge) = self.param.as_mut() else {
                    return 0;
                };
                let removed = Arc::make_mut(&mut edge.node).remove(rest, pattern);
                if edge.node.is_empty() {
                    self.param = None;
                }
                removed
            }
            Segment::Wildcard(_) => {
                let Some(edge) = self.wildcard.as_mut() else {
                    return 0;
                };
                let before = edge.leaves.len();
                edge.leaves.retain(|l| &*l.pattern != pattern);
                let removed = before - edge.leaves.len();
                if edge.leaves.is_empty() {
                    self.wildcard = None;
                }
                removed
            }
        }
    }

    fn search<'a>(
        &'a self,
        segs: &[&str],
        opts: TreeOptions,
        caps: &mut Captures,
    ) -> Option<&'a Leaf<T>> {
        let Some((seg, rest)) = segs.split_first() else {
            if let Some(leaf) = self.leaves.first() {
                return Some(leaf);
            }
            // `*` also matches an empty remainder
            let edge = self.wildcard.as_ref()?;
            if edge.kind != WildcardKind::Splat {
                return None;
            }
            let leaf = edge.leaves.first()?;
            caps.push(String::new());
            return Some(leaf);
        };

        let key: Cow<'_, str> = if opts.case_sensitive {
            Cow::Borrowed(seg)
        } else {
            Cow::Owned(seg.to_lowercase())
        };
        if let Some(child) = self.statics.get(key.as_ref()) {
            if let Some(leaf) = child.search(rest, opts, caps) {
                return Some(leaf);
            }
        }

        if let Some(edge) = &self.param {
            let accepted = !seg.is_empty()
                && edge.constraint.as_ref().map_or(true, |c| c.is_match(seg));
            if accepted {
                let mark = caps.len();
                caps.push((*seg).to_string());
                if let Some(leaf) = edge.node.search(rest, opts, caps) {
                    return Some(leaf);
                }
                caps.truncate(mark);
            }
        }

        if let Some(edge) = &self.wildcard {
            let remainder = segs.join("/");
            if let (Some(leaf), Some(values)) = (edge.leaves.first(), edge.kind.capture(&remainder)) {
                caps.extend(values.into_iter().flatten());
                return Some(leaf);
            }
        }

        None
    }

    fn collect_patterns(&self, out: &mut Vec<Arc<str>>) {
        out.extend(self.leaves.iter().map(|l| Arc::clone(&l.pattern)));
        if let Some(edge) = &self.wildcard {
            out.extend(edge.leaves.iter().map(|l| Arc::clone(&l.pattern)));
        }
        for child in self.statics.values() {
            child.collect_patterns(out);
        }
        if let Some(edge) = &self.param {
            edge.node.collect_patterns(out);
        }
    }
}

fn describe(constraint: Option<&Constraint>) -> String {
    match constraint {
        Some(c) => format!("'({})'", c.source()),
        None => "'(any)'".to_string(),
    }
}

/// Result of a successful [`Tree::find`].
#[derive(Debug)]
pub struct TreeMatch<'a, T> {
    /// Value registered with the matched pattern
    pub value: &'a Arc<T>,
    /// The matched pattern as registered
    pub pattern: &'a Arc<str>,
    /// Captured parameters in pattern order
    pub params: ParamVec,
}

/// Segment trie mapping patterns to values of type `T`.
pub struct Tree<T> {
    root: Arc<Node<T>>,
    opts: TreeOptions,
}

impl<T> Clone for Tree<T> {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            opts: self.opts,
        }
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new(TreeOptions::default())
    }
}

impl<T> Tree<T> {
    /// Empty tree matching under `opts`.
    #[must_use]
    pub fn new(opts: TreeOptions) -> Self {
        Self {
            root: Arc::new(Node::new()),
            opts,
        }
    }

    /// Options this tree was built with.
    #[must_use]
    pub fn options(&self) -> TreeOptions {
        self.opts
    }

    /// Insert `value` under `pattern`.
    ///
    /// A pattern ending in `?:name` is stored twice: once at the parent node
    /// without the capture, once at the parameter node with it.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::Conflict`] when the pattern is structurally
    /// ambiguous with one already present. The tree is untouched in that case.
    pub fn insert(&mut self, pattern: &Pattern, value: Arc<T>) -> Result<(), RegistrationError> {
        let segs = pattern.segments();
        self.root.check(segs, pattern.as_str(), 0)?;

        let names: Arc<[Arc<str>]> = pattern.param_names().iter().cloned().collect();
        let root = Arc::make_mut(&mut self.root);
        if pattern.has_optional_tail() {
            let head = &segs[..segs.len() - 1];
            let head_names: Arc<[Arc<str>]> =
                names[..names.len().saturating_sub(1)].iter().cloned().collect();
            root.insert(
                head,
                Leaf {
                    pattern: Arc::clone(pattern.raw()),
                    names: head_names,
                    value: Arc::clone(&value),
                },
            );
        }
        root.insert(
            segs,
            Leaf {
                pattern: Arc::clone(pattern.raw()),
                names,
                value,
            },
        );
        Ok(())
    }

    /// Remove every leaf registered under exactly `pattern`.
    ///
    /// Returns the number of leaves detached (two for an optional-tail
    /// pattern). Emptied nodes are pruned.
    pub fn remove(&mut self, pattern: &Pattern) -> usize {
        let segs = pattern.segments();
        let raw = pattern.as_str();
        let mut removed = 0;
        if pattern.has_optional_tail() {
            let head = &segs[..segs.len() - 1];
            if self.root.contains(head, raw) {
                removed += Arc::make_mut(&mut self.root).remove(head, raw);
            }
        }
        if self.root.contains(segs, raw) {
            removed += Arc::make_mut(&mut self.root).remove(segs, raw);
        }
        removed
    }

    /// Value stored under exactly `pattern`, if any.
    #[must_use]
    pub fn get(&self, pattern: &Pattern) -> Option<&Arc<T>> {
        self.root.lookup(pattern.segments(), pattern.as_str())
    }

    /// Match a request path.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<TreeMatch<'_, T>> {
        let segs: SmallVec<[&str; 16]> = split_path(path, self.opts.strict_slash).collect();
        let mut caps = Captures::new();
        let leaf = self.root.search(&segs, self.opts, &mut caps)?;
        let params: ParamVec = leaf
            .names
            .iter()
            .cloned()
            .zip(caps)
            .collect();
        Some(TreeMatch {
            value: &leaf.value,
            pattern: &leaf.pattern,
            params,
        })
    }

    /// Whether `path` matches any pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    /// Registered pattern strings, sorted and de-duplicated.
    #[must_use]
    pub fn patterns(&self) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        self.root.collect_patterns(&mut out);
        out.sort();
        out.dedup();
        out
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}
