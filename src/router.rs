//! Radix-style path tree: static segments branch first, then constrained
//! parameters, then unconstrained parameters, then a trailing wildcard —
//! matching with backtracking so a static branch that fails deeper in the
//! path doesn't shadow a parameter branch that would have matched.
//!
//! Grounded on the teacher's `Router`/`Route` pair (`router.rs`, `route.rs`):
//! kept the `RwLock`-guarded global middleware list and the `merge()` shape,
//! replaced the teacher's flat per-route `match_path` scan with a real tree
//! and added [`Router::mount_sub`] for isolated sub-app containers. `Segment::Wildcard`
//! (`*name`) is a supplemental catch-all route feature, not something
//! `mount_sub` itself requires — see the `Route` entry in DESIGN.md.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use http::Method;
use regex::Regex;

use crate::middleware::{HandlerFn, MiddlewareFn};
use crate::request::PathParams;
use crate::route::{Route, Segment, compile};

struct Node {
    static_children: HashMap<String, Node>,
    constrained_child: Option<(String, Arc<Regex>, Box<Node>)>,
    param_child: Option<(String, Box<Node>)>,
    wildcard: Option<(String, HashMap<Method, Arc<Route>>)>,
    routes: HashMap<Method, Arc<Route>>,
    /// An isolated container mounted at this node's path; matched only after
    /// exhausting this node's own routes and children.
    mounted: Option<Arc<Router>>,
}

impl Node {
    fn new() -> Self {
        Self {
            static_children: HashMap::new(),
            constrained_child: None,
            param_child: None,
            wildcard: None,
            routes: HashMap::new(),
            mounted: None,
        }
    }
}

/// A matched route plus the path parameters bound along the way.
pub struct Matched {
    pub handler: HandlerFn,
    pub middlewares: Vec<MiddlewareFn>,
    pub params: PathParams,
}

/// The path tree plus the router's own global middleware chain.
pub struct Router {
    root: RwLock<Node>,
    middlewares: RwLock<Vec<MiddlewareFn>>,
    mount_prefix: RwLock<Option<String>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Node::new()),
            middlewares: RwLock::new(Vec::new()),
            mount_prefix: RwLock::new(None),
        }
    }

    /// Normalizes a path: collapses repeated `/`, strips a trailing `/`
    /// (except for the root path itself).
    pub fn normalize(path: &str) -> String {
        let collapsed: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if collapsed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", collapsed.join("/"))
        }
    }

    /// Registers a route. Fails with a conflict message if `(method, path)`
    /// (after normalization) is already registered.
    pub fn insert(&self, method: Method, path: &str, handler: HandlerFn) -> Result<(), String> {
        let normalized = Self::normalize(path);
        let segments = compile(&normalized)?;
        let route = Arc::new(Route {
            path: normalized.clone(),
            method: method.clone(),
            segments: segments.clone(),
            handler,
            middlewares: Vec::new(),
        });

        let mut root = self.root.write().unwrap();

        if let Some(Segment::Wildcard(name)) = segments.last() {
            let node = descend(&mut root, &segments[..segments.len() - 1])?;
            match &mut node.wildcard {
                Some((existing_name, routes)) if existing_name == name => {
                    if routes.contains_key(&method) {
                        return Err(format!("route conflict: {method} {normalized}"));
                    }
                    routes.insert(method, route);
                }
                Some((existing_name, _)) => {
                    return Err(format!(
                        "route conflict: wildcard name mismatch at this position (`{existing_name}` vs `{name}`)"
                    ));
                }
                None => {
                    let mut routes = HashMap::new();
                    routes.insert(method, route);
                    node.wildcard = Some((name.clone(), routes));
                }
            }
            return Ok(());
        }

        let node = descend(&mut root, &segments)?;
        if node.routes.contains_key(&method) {
            return Err(format!("route conflict: {method} {normalized}"));
        }
        node.routes.insert(method, route);
        Ok(())
    }

    /// Adds middleware to a previously-inserted route, identified by method and
    /// original (pre-normalization) path.
    pub fn route_middleware(
        &self,
        method: &Method,
        path: &str,
        mw: MiddlewareFn,
    ) -> Result<(), String> {
        let normalized = Self::normalize(path);
        let segments = compile(&normalized)?;
        let mut root = self.root.write().unwrap();

        if let Some(Segment::Wildcard(_)) = segments.last() {
            let node = descend(&mut root, &segments[..segments.len() - 1])?;
            let (_, routes) = node
                .wildcard
                .as_mut()
                .ok_or_else(|| format!("no such route: {method} {normalized}"))?;
            let route = routes
                .get_mut(method)
                .ok_or_else(|| format!("no such route: {method} {normalized}"))?;
            Arc::make_mut(route).middleware(mw);
            return Ok(());
        }

        let node = descend(&mut root, &segments)?;
        let route = node
            .routes
            .get_mut(method)
            .ok_or_else(|| format!("no such route: {method} {normalized}"))?;
        Arc::make_mut(route).middleware(mw);
        Ok(())
    }

    /// Mounts an isolated sub-router at `prefix`. Fails if something is
    /// already mounted at that exact prefix.
    pub fn mount_sub(&self, prefix: &str, sub: Arc<Router>) -> Result<(), String> {
        let normalized = Self::normalize(prefix);
        *sub.mount_prefix.write().unwrap() = Some(normalized.clone());
        let segments = compile(&normalized)?;
        let mut root = self.root.write().unwrap();
        let node = descend(&mut root, &segments)?;
        if node.mounted.is_some() {
            return Err(format!("route conflict: sub-app already mounted at {normalized}"));
        }
        node.mounted = Some(sub);
        Ok(())
    }

    pub fn middleware(&self, mw: MiddlewareFn) {
        self.middlewares.write().unwrap().push(mw);
    }

    fn global_middlewares(&self) -> Vec<MiddlewareFn> {
        self.middlewares.read().unwrap().clone()
    }

    /// Matches `method`/`path` against the tree, returning the handler, the
    /// combined (router-global + route) middleware chain in execution order,
    /// and bound path parameters. Delegates into a mounted sub-router's own
    /// tree (and its own global middleware, appended after this router's)
    /// when the match falls under a mount point.
    pub fn find(&self, method: &Method, path: &str) -> Option<Matched> {
        let normalized = Self::normalize(path);
        let parts: Vec<&str> = normalized.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        let root = self.root.read().unwrap();
        let mut params = HashMap::new();
        let found = match_node(&root, method, &parts, 0, &mut params)?;

        match found {
            Found::Route(route) => {
                let mut chain = self.global_middlewares();
                chain.extend(route.middlewares.iter().cloned());
                Some(Matched {
                    handler: route.handler.clone(),
                    middlewares: chain,
                    params: PathParams(params),
                })
            }
            Found::Mounted(sub, remainder) => {
                let mut matched = sub.find(method, &remainder)?;
                let mut chain = self.global_middlewares();
                chain.append(&mut matched.middlewares);
                matched.params.0.extend(params);
                matched.middlewares = chain;
                Some(matched)
            }
        }
    }

    /// Merges `other`'s routes into `self`, prepending `other`'s global
    /// middleware onto every merged route so the merged router behaves as if
    /// the routes had always lived here.
    pub fn merge(&self, other: Router) -> Result<(), String> {
        let other_mws = other.middlewares.into_inner().unwrap();
        merge_node(
            &mut self.root.write().unwrap(),
            other.root.into_inner().unwrap(),
            &other_mws,
            String::new(),
        )
    }
}

enum Found {
    Route(Arc<Route>),
    Mounted(Arc<Router>, String),
}

fn match_node<'a>(
    node: &Node,
    method: &Method,
    parts: &[&'a str],
    idx: usize,
    params: &mut HashMap<String, String>,
) -> Option<Found> {
    if idx == parts.len() {
        if let Some(mounted) = &node.mounted {
            return Some(Found::Mounted(mounted.clone(), "/".to_string()));
        }
        return node.routes.get(method).cloned().map(Found::Route);
    }

    let segment = parts[idx];

    if let Some(mounted) = &node.mounted {
        let remainder = format!("/{}", parts[idx..].join("/"));
        return Some(Found::Mounted(mounted.clone(), remainder));
    }

    if let Some(child) = node.static_children.get(segment) {
        let snapshot = params.clone();
        if let Some(found) = match_node(child, method, parts, idx + 1, params) {
            return Some(found);
        }
        *params = snapshot;
    }

    if let Some((name, regex, child)) = &node.constrained_child {
        if regex.is_match(segment) {
            let snapshot = params.clone();
            params.insert(name.clone(), segment.to_string());
            if let Some(found) = match_node(child, method, parts, idx + 1, params) {
                return Some(found);
            }
            *params = snapshot;
        }
    }

    if let Some((name, child)) = &node.param_child {
        let snapshot = params.clone();
        params.insert(name.clone(), segment.to_string());
        if let Some(found) = match_node(child, method, parts, idx + 1, params) {
            return Some(found);
        }
        *params = snapshot;
    }

    if let Some((name, routes)) = &node.wildcard {
        if let Some(route) = routes.get(method) {
            params.insert(name.clone(), parts[idx..].join("/"));
            return Some(Found::Route(route.clone()));
        }
    }

    None
}

fn descend<'a>(node: &'a mut Node, segments: &[Segment]) -> Result<&'a mut Node, String> {
    let mut current = node;
    for segment in segments {
        current = match segment {
            Segment::Static(s) => current
                .static_children
                .entry(s.clone())
                .or_insert_with(Node::new),
            Segment::ConstrainedParam(name, regex) => {
                match &current.constrained_child {
                    Some((existing_name, _, _)) if existing_name != name => {
                        return Err(format!(
                            "route conflict: constrained parameter name mismatch at this position (`{existing_name}` vs `{name}`)"
                        ));
                    }
                    _ => {}
                }
                if current.constrained_child.is_none() {
                    current.constrained_child =
                        Some((name.clone(), regex.clone(), Box::new(Node::new())));
                }
                &mut current.constrained_child.as_mut().unwrap().2
            }
            Segment::Param(name) => {
                match &current.param_child {
                    Some((existing_name, _)) if existing_name != name => {
                        return Err(format!(
                            "route conflict: parameter name mismatch at this position (`{existing_name}` vs `{name}`)"
                        ));
                    }
                    _ => {}
                }
                if current.param_child.is_none() {
                    current.param_child = Some((name.clone(), Box::new(Node::new())));
                }
                &mut current.param_child.as_mut().unwrap().1
            }
            Segment::Wildcard(_) => {
                // Wildcards are terminal and stored directly on the parent node
                // by the caller (insert); descend should never be asked to
                // continue past one.
                return Err("wildcard segment must be last".to_string());
            }
        };
    }
    Ok(current)
}

fn merge_node(
    dest: &mut Node,
    src: Node,
    other_global: &[MiddlewareFn],
    _path_so_far: String,
) -> Result<(), String> {
    for (method, route) in src.routes {
        if dest.routes.contains_key(&method) {
            return Err(format!("route conflict: {method} {}", route.path));
        }
        let mut merged = (*route).clone();
        merged.middlewares = other_global
            .iter()
            .cloned()
            .chain(merged.middlewares.iter().cloned())
            .collect();
        dest.routes.insert(method, Arc::new(merged));
    }

    if let Some(mounted) = src.mounted {
        if dest.mounted.is_some() {
            return Err("route conflict: sub-app already mounted".to_string());
        }
        dest.mounted = Some(mounted);
    }

    for (key, child) in src.static_children {
        let entry = dest.static_children.entry(key).or_insert_with(Node::new);
        merge_node(entry, child, other_global, String::new())?;
    }

    if let Some((name, regex, child)) = src.constrained_child {
        let entry = dest
            .constrained_child
            .get_or_insert_with(|| (name.clone(), regex.clone(), Box::new(Node::new())));
        merge_node(&mut entry.2, *child, other_global, String::new())?;
    }

    if let Some((name, child)) = src.param_child {
        let entry = dest
            .param_child
            .get_or_insert_with(|| (name.clone(), Box::new(Node::new())));
        merge_node(&mut entry.1, *child, other_global, String::new())?;
    }

    if let Some((name, routes)) = src.wildcard {
        match &mut dest.wildcard {
            Some((existing_name, existing_routes)) => {
                if existing_name != &name {
                    return Err(format!(
                        "route conflict: wildcard name mismatch (`{existing_name}` vs `{name}`)"
                    ));
                }
                for (method, route) in routes {
                    if existing_routes.contains_key(&method) {
                        return Err(format!("route conflict: {method} *{name}"));
                    }
                    let mut merged = (*route).clone();
                    merged.middlewares = other_global
                        .iter()
                        .cloned()
                        .chain(merged.middlewares.iter().cloned())
                        .collect();
                    existing_routes.insert(method, Arc::new(merged));
                }
            }
            None => {
                let merged: HashMap<_, _> = routes
                    .into_iter()
                    .map(|(method, route)| {
                        let mut merged = (*route).clone();
                        merged.middlewares = other_global
                            .iter()
                            .cloned()
                            .chain(merged.middlewares.iter().cloned())
                            .collect();
                        (method, Arc::new(merged))
                    })
                    .collect();
                dest.wildcard = Some((name, merged));
            }
        }
    }

    Ok(())
}
