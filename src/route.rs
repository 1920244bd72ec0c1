//! A single registered route: its compiled path pattern, handler, and
//! route-specific middleware chain.

use std::sync::Arc;

use http::Method;
use regex::Regex;

use crate::middleware::{HandlerFn, MiddlewareFn};

/// One segment of a compiled path pattern.
#[derive(Clone)]
pub enum Segment {
    Static(String),
    /// `:name` — matches exactly one segment.
    Param(String),
    /// `:name(regex)` — matches exactly one segment constrained by `regex`.
    ConstrainedParam(String, Arc<Regex>),
    /// `*name` — matches one or more trailing segments, must be last.
    Wildcard(String),
}

#[derive(Clone)]
pub struct Route {
    pub path: String,
    pub method: Method,
    pub segments: Vec<Segment>,
    pub handler: HandlerFn,
    pub middlewares: Vec<MiddlewareFn>,
}

impl Route {
    pub fn new(path: String, method: Method, handler: HandlerFn) -> Result<Self, String> {
        let segments = compile(&path)?;
        Ok(Self {
            path,
            method,
            segments,
            handler,
            middlewares: Vec::new(),
        })
    }

    pub fn middleware(&mut self, mw: MiddlewareFn) {
        self.middlewares.push(mw);
    }
}

/// Splits a normalized path into compiled segments.
pub fn compile(path: &str) -> Result<Vec<Segment>, String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let parts: Vec<&str> = trimmed.split('/').collect();
    let last = parts.len() - 1;

    for (i, part) in parts.into_iter().enumerate() {
        if let Some(rest) = part.strip_prefix(':') {
            if i != last && segments.iter().any(|s| matches!(s, Segment::Wildcard(_))) {
                return Err("wildcard segment must be last".to_string());
            }
            if let Some(open) = rest.find('(') {
                if !rest.ends_with(')') {
                    return Err(format!("malformed constrained parameter segment: {part}"));
                }
                let name = rest[..open].to_string();
                let pattern = &rest[open + 1..rest.len() - 1];
                let regex = Regex::new(pattern)
                    .map_err(|e| format!("invalid regex in segment {part}: {e}"))?;
                segments.push(Segment::ConstrainedParam(name, Arc::new(regex)));
            } else {
                segments.push(Segment::Param(rest.to_string()));
            }
        } else if let Some(rest) = part.strip_prefix('*') {
            if i != last {
                return Err("wildcard segment must be last".to_string());
            }
            segments.push(Segment::Wildcard(rest.to_string()));
        } else {
            segments.push(Segment::Static(part.to_string()));
        }
    }

    Ok(segments)
}
