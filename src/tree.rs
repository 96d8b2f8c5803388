//! Radix tree route matching.
//!
//! Each HTTP method owns a [`PathTree`]: a compressed prefix tree whose edges
//! hold byte fragments of the registered patterns. Three kinds of node exist:
//!
//! - static nodes match their fragment exactly,
//! - param nodes (`:name`) capture one non-empty run of bytes up to the next `/`,
//! - catch-all nodes (`*name`) capture the non-empty rest of the path.
//!
//! Static children are indexed by their first byte and kept sorted by
//! priority, the number of registered routes below them, so busier branches
//! are tried first. At a branching point static children win over the param
//! child, which wins over the catch-all child; a branch that dead-ends falls
//! back to the next alternative.

use std::mem;

use hyper::Method;

use crate::error::RouteError;
use crate::handler::{self, HandlersChain};
use crate::params::Params;
use crate::path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Static,
    Param,
    CatchAll,
}

/// A pattern split at its wildcards.
#[derive(Debug, PartialEq, Eq)]
enum Piece<'p> {
    Static(&'p [u8]),
    /// Includes the leading `:`.
    Param(&'p [u8]),
    /// Includes the leading `*`.
    CatchAll(&'p [u8]),
}

/// Splits `pattern` into static runs and wildcards, validating wildcard syntax.
fn parse(pattern: &str) -> Result<Vec<Piece<'_>>, RouteError> {
    let bytes = pattern.as_bytes();
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c != b':' && c != b'*' {
            i += 1;
            continue;
        }

        let end = bytes[i..]
            .iter()
            .position(|&b| b == b'/')
            .map_or(bytes.len(), |p| i + p);
        let wildcard = &bytes[i..end];

        if wildcard[1..].iter().any(|&b| b == b':' || b == b'*') {
            return Err(RouteError::MultipleWildcards {
                segment: pattern[i..end].to_owned(),
                path: pattern.to_owned(),
            });
        }
        if wildcard.len() < 2 {
            return Err(RouteError::UnnamedWildcard(pattern.to_owned()));
        }
        if start < i {
            pieces.push(Piece::Static(&bytes[start..i]));
        }

        if c == b'*' {
            if end != bytes.len() {
                return Err(RouteError::CatchAllNotLast(pattern.to_owned()));
            }
            if i == 0 || bytes[i - 1] != b'/' {
                return Err(RouteError::CatchAllWithoutSlash(pattern.to_owned()));
            }
            pieces.push(Piece::CatchAll(wildcard));
        } else {
            pieces.push(Piece::Param(wildcard));
        }

        start = end;
        i = end;
    }

    if start < bytes.len() {
        pieces.push(Piece::Static(&bytes[start..]));
    }
    Ok(pieces)
}

/// The registration being inserted.
struct Route<'a> {
    pattern: &'a str,
    handlers: &'a HandlersChain,
}

#[derive(Debug, Clone)]
struct Node {
    path: Vec<u8>,
    /// Wildcard name without its `:` or `*`; empty for static nodes.
    name: String,
    priority: u32,
    /// First byte of each static child, parallel to `children`.
    indices: Vec<u8>,
    children: Vec<Node>,
    param: Option<Box<Node>>,
    catch_all: Option<Box<Node>>,
    handlers: Option<HandlersChain>,
}

impl Node {
    fn new(kind: Kind, path: &[u8]) -> Self {
        let name = match kind {
            Kind::Static => String::new(),
            Kind::Param | Kind::CatchAll => String::from_utf8_lossy(&path[1..]).into_owned(),
        };
        Self {
            path: path.to_vec(),
            name,
            priority: 0,
            indices: Vec::new(),
            children: Vec::new(),
            param: None,
            catch_all: None,
            handlers: None,
        }
    }

    fn ends_segment(&self) -> bool {
        self.path.last() == Some(&b'/')
    }

    /// Consumes the next piece of the pattern below this node.
    fn descend(&mut self, pieces: &[Piece<'_>], route: &Route<'_>) -> Result<(), RouteError> {
        match pieces.split_first() {
            None => self.set_handlers(route),
            Some((Piece::Static(bytes), rest)) => self.insert_static(bytes, rest, route),
            Some((Piece::Param(wildcard), rest)) => self.insert_param(wildcard, rest, route),
            Some((Piece::CatchAll(wildcard), _)) => self.insert_catch_all(wildcard, route),
        }
    }

    fn set_handlers(&mut self, route: &Route<'_>) -> Result<(), RouteError> {
        if self.handlers.is_some() {
            return Err(RouteError::Duplicate(route.pattern.to_owned()));
        }
        self.handlers = Some(route.handlers.clone());
        Ok(())
    }

    /// Places the non-empty static run `bytes` among this node's children.
    fn insert_static(
        &mut self,
        bytes: &[u8],
        rest: &[Piece<'_>],
        route: &Route<'_>,
    ) -> Result<(), RouteError> {
        let first = bytes[0];
        if let Some(pos) = self.indices.iter().position(|&b| b == first) {
            let pos = self.bump_child(pos);
            return self.children[pos].merge(bytes, rest, route);
        }

        if let Some(param) = &self.param {
            if !self.ends_segment() {
                return Err(RouteError::SegmentConflict {
                    wildcard: String::from_utf8_lossy(&param.path).into_owned(),
                    path: route.pattern.to_owned(),
                });
            }
        }

        self.indices.push(first);
        self.children.push(Node::new(Kind::Static, bytes));
        let pos = self.bump_child(self.children.len() - 1);
        self.children[pos].descend(rest, route)
    }

    /// Matches `bytes` against this static node, splitting the edge where they diverge.
    fn merge(
        &mut self,
        bytes: &[u8],
        rest: &[Piece<'_>],
        route: &Route<'_>,
    ) -> Result<(), RouteError> {
        let common = self
            .path
            .iter()
            .zip(bytes)
            .take_while(|(a, b)| a == b)
            .count();

        if common < self.path.len() {
            self.split(common);
        }
        if common < bytes.len() {
            self.insert_static(&bytes[common..], rest, route)
        } else {
            self.descend(rest, route)
        }
    }

    /// Moves everything after `at` into a single new static child.
    fn split(&mut self, at: usize) {
        let tail = Node {
            path: self.path.split_off(at),
            name: String::new(),
            // the route being inserted does not pass through the tail
            priority: self.priority.saturating_sub(1),
            indices: mem::take(&mut self.indices),
            children: mem::take(&mut self.children),
            param: self.param.take(),
            catch_all: self.catch_all.take(),
            handlers: self.handlers.take(),
        };
        self.indices = vec![tail.path[0]];
        self.children = vec![tail];
    }

    fn insert_param(
        &mut self,
        wildcard: &[u8],
        rest: &[Piece<'_>],
        route: &Route<'_>,
    ) -> Result<(), RouteError> {
        if !self.ends_segment() && !self.children.is_empty() {
            return Err(RouteError::SegmentConflict {
                wildcard: String::from_utf8_lossy(wildcard).into_owned(),
                path: route.pattern.to_owned(),
            });
        }

        if let Some(param) = self.param.as_deref_mut() {
            if param.path != wildcard {
                return Err(RouteError::WildcardConflict {
                    wildcard: String::from_utf8_lossy(wildcard).into_owned(),
                    existing: String::from_utf8_lossy(&param.path).into_owned(),
                    path: route.pattern.to_owned(),
                });
            }
            param.priority += 1;
            return param.descend(rest, route);
        }

        let mut param = Node::new(Kind::Param, wildcard);
        param.priority = 1;
        let inserted = param.descend(rest, route);
        self.param = Some(Box::new(param));
        inserted
    }

    fn insert_catch_all(&mut self, wildcard: &[u8], route: &Route<'_>) -> Result<(), RouteError> {
        if let Some(existing) = &self.catch_all {
            if existing.path == wildcard {
                return Err(RouteError::Duplicate(route.pattern.to_owned()));
            }
            return Err(RouteError::WildcardConflict {
                wildcard: String::from_utf8_lossy(wildcard).into_owned(),
                existing: String::from_utf8_lossy(&existing.path).into_owned(),
                path: route.pattern.to_owned(),
            });
        }

        let mut leaf = Node::new(Kind::CatchAll, wildcard);
        leaf.priority = 1;
        leaf.handlers = Some(route.handlers.clone());
        self.catch_all = Some(Box::new(leaf));
        Ok(())
    }

    /// Increments a child's priority and moves it forward past lower-priority
    /// siblings. Returns the child's new position.
    fn bump_child(&mut self, pos: usize) -> usize {
        self.children[pos].priority += 1;
        let priority = self.children[pos].priority;

        let mut new_pos = pos;
        while new_pos > 0 && self.children[new_pos - 1].priority < priority {
            self.children.swap(new_pos - 1, new_pos);
            self.indices.swap(new_pos - 1, new_pos);
            new_pos -= 1;
        }
        new_pos
    }

    fn find<'n>(&'n self, path: &[u8], params: &mut Params, unescape: bool) -> Option<&'n HandlersChain> {
        let rest = path.strip_prefix(self.path.as_slice())?;
        self.find_below(rest, params, unescape)
    }

    /// Resolves `rest`, the part of the path after this node's fragment.
    fn find_below<'n>(
        &'n self,
        rest: &[u8],
        params: &mut Params,
        unescape: bool,
    ) -> Option<&'n HandlersChain> {
        let Some(&first) = rest.first() else {
            return self.handlers.as_ref();
        };

        if let Some(pos) = self.indices.iter().position(|&b| b == first) {
            if let Some(found) = self.children[pos].find(rest, params, unescape) {
                return Some(found);
            }
        }

        if let Some(param) = &self.param {
            let end = segment_end(rest);
            if end > 0 {
                let mark = params.len();
                params.push(&param.name, decode(&rest[..end], unescape));
                if let Some(found) = param.find_below(&rest[end..], params, unescape) {
                    return Some(found);
                }
                params.truncate(mark);
            }
        }

        let catch_all = self.catch_all.as_ref()?;
        params.push(&catch_all.name, decode(rest, unescape));
        catch_all.handlers.as_ref()
    }

    fn find_case_insensitive(&self, path: &[u8], out: &mut Vec<u8>, fix_slash: bool) -> bool {
        let n = self.path.len();
        if path.len() >= n && path[..n].eq_ignore_ascii_case(&self.path) {
            let mark = out.len();
            out.extend_from_slice(&self.path);
            if self.find_case_insensitive_below(&path[n..], out, fix_slash) {
                return true;
            }
            out.truncate(mark);
            return false;
        }

        // the request lacks only this node's trailing slash
        if fix_slash
            && n > 0
            && path.len() + 1 == n
            && self.path[n - 1] == b'/'
            && path.eq_ignore_ascii_case(&self.path[..n - 1])
            && self.handlers.is_some()
        {
            out.extend_from_slice(&self.path);
            return true;
        }
        false
    }

    fn find_case_insensitive_below(&self, rest: &[u8], out: &mut Vec<u8>, fix_slash: bool) -> bool {
        let Some(&first) = rest.first() else {
            if self.handlers.is_some() {
                return true;
            }
            let slash_leaf = self
                .indices
                .iter()
                .position(|&b| b == b'/')
                .map(|pos| &self.children[pos])
                .filter(|child| child.path == b"/" && child.handlers.is_some());
            if fix_slash && slash_leaf.is_some() {
                out.push(b'/');
                return true;
            }
            return false;
        };

        for child in &self.children {
            if child.path[0].eq_ignore_ascii_case(&first)
                && child.find_case_insensitive(rest, out, fix_slash)
            {
                return true;
            }
        }

        if let Some(param) = &self.param {
            let end = segment_end(rest);
            if end > 0 {
                let mark = out.len();
                out.extend_from_slice(&rest[..end]);
                if param.find_case_insensitive_below(&rest[end..], out, fix_slash) {
                    return true;
                }
                out.truncate(mark);
            }
        }

        if let Some(catch_all) = &self.catch_all {
            if catch_all.handlers.is_some() {
                out.extend_from_slice(rest);
                return true;
            }
        }

        // the request carries a trailing slash this node does not
        fix_slash && rest == b"/" && self.handlers.is_some()
    }

    /// Depth-first walk: static children in priority order, then param, then catch-all.
    fn walk<'n>(&'n self, prefix: &mut Vec<u8>, visit: &mut impl FnMut(String, &'n HandlersChain)) {
        let mark = prefix.len();
        prefix.extend_from_slice(&self.path);

        if let Some(handlers) = &self.handlers {
            visit(String::from_utf8_lossy(prefix).into_owned(), handlers);
        }
        for child in &self.children {
            child.walk(prefix, visit);
        }
        if let Some(param) = &self.param {
            param.walk(prefix, visit);
        }
        if let Some(catch_all) = &self.catch_all {
            catch_all.walk(prefix, visit);
        }

        prefix.truncate(mark);
    }
}

fn segment_end(rest: &[u8]) -> usize {
    rest.iter().position(|&b| b == b'/').unwrap_or(rest.len())
}

/// Converts a captured value, percent-decoding it when asked to. Values that
/// do not decode to UTF-8 are kept raw.
fn decode(raw: &[u8], unescape: bool) -> String {
    let raw = String::from_utf8_lossy(raw);
    if unescape {
        if let Ok(decoded) = urlencoding::decode(&raw) {
            return decoded.into_owned();
        }
    }
    raw.into_owned()
}

/// Result of [`PathTree::get_value`].
#[derive(Debug)]
pub struct Lookup<'t> {
    pub handlers: Option<&'t HandlersChain>,
    /// Set on a miss when the path with its trailing slash toggled would match.
    pub tsr: bool,
}

/// The routes registered for a single HTTP method.
#[derive(Debug, Clone)]
pub struct PathTree {
    root: Node,
}

impl Default for PathTree {
    fn default() -> Self {
        Self {
            root: Node::new(Kind::Static, b""),
        }
    }
}

impl PathTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handlers` under `pattern`.
    ///
    /// The insertion is atomic: on error the tree is left exactly as it was.
    ///
    /// # Errors
    /// Returns a [`RouteError`] for malformed wildcards, wildcard conflicts and
    /// duplicate registrations.
    pub fn insert(&mut self, pattern: &str, handlers: HandlersChain) -> Result<(), RouteError> {
        let pieces = parse(pattern)?;
        let route = Route {
            pattern,
            handlers: &handlers,
        };

        let mut root = self.root.clone();
        root.priority += 1;
        root.descend(&pieces, &route)?;
        self.root = root;
        Ok(())
    }

    /// Looks up `path`, appending captured parameters to `params`.
    ///
    /// On a miss `params` is restored to its previous length and
    /// [`Lookup::tsr`] reports whether the slash-toggled path is registered.
    pub fn get_value(&self, path: &str, params: &mut Params, unescape: bool) -> Lookup<'_> {
        let mark = params.len();
        if let Some(handlers) = self.root.find(path.as_bytes(), params, unescape) {
            return Lookup {
                handlers: Some(handlers),
                tsr: false,
            };
        }
        params.truncate(mark);

        let tsr = path::toggle_trailing_slash(path).map_or(false, |other| {
            self.root
                .find(other.as_bytes(), &mut Params::new(), false)
                .is_some()
        });
        Lookup { handlers: None, tsr }
    }

    /// Finds the registered spelling of `path`, ignoring ASCII case and,
    /// with `fix_trailing_slash`, a missing or extra trailing slash.
    pub fn find_case_insensitive_path(&self, path: &str, fix_trailing_slash: bool) -> Option<String> {
        let mut out = Vec::with_capacity(path.len() + 1);
        if self
            .root
            .find_case_insensitive(path.as_bytes(), &mut out, fix_trailing_slash)
        {
            String::from_utf8(out).ok()
        } else {
            None
        }
    }

    /// Every registered pattern with its chain, in traversal order.
    pub fn routes(&self) -> Vec<(String, &HandlersChain)> {
        let mut routes = Vec::new();
        self.root
            .walk(&mut Vec::new(), &mut |path, handlers| routes.push((path, handlers)));
        routes
    }

    /// True if `path` resolves to a chain, ignoring parameters.
    pub fn matches(&self, path: &str, unescape: bool) -> bool {
        self.root
            .find(path.as_bytes(), &mut Params::new(), unescape)
            .is_some()
    }
}

/// Route information yielded by introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub path: String,
    /// Name of the last handler in the chain.
    pub handler: &'static str,
}

/// One [`PathTree`] per HTTP method, in registration order.
#[derive(Debug, Clone, Default)]
pub struct MethodTrees {
    trees: Vec<(Method, PathTree)>,
}

impl MethodTrees {
    pub fn get(&self, method: &Method) -> Option<&PathTree> {
        self.trees
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, tree)| tree)
    }

    pub fn get_or_insert(&mut self, method: Method) -> &mut PathTree {
        let pos = match self.trees.iter().position(|(m, _)| *m == method) {
            Some(pos) => pos,
            None => {
                self.trees.push((method, PathTree::new()));
                self.trees.len() - 1
            }
        };
        &mut self.trees[pos].1
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Method, &PathTree)> {
        self.trees.iter().map(|(m, tree)| (m, tree))
    }

    /// Flattens every tree into (method, pattern, handler name) entries.
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.iter()
            .flat_map(|(method, tree)| {
                tree.routes().into_iter().map(move |(path, handlers)| RouteInfo {
                    method: method.clone(),
                    path,
                    handler: handler::last_name(handlers),
                })
            })
            .collect()
    }
}
