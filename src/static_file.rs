//! Static directory and single-file serving.
//!
//! Grounded on the teacher's `static.rs` (`ServeDir`/`ServeFile`): kept the
//! sanitize-then-serve shape and the directory-traversal guard, adapted from
//! `impl Responder`-returning handlers to methods that populate the framework's
//! shared [`Response`] in place and return `Result<(), AppError>` like any
//! other handler.

use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::request::Request;
use crate::response::Response;

/// Serves files from a base directory, with an optional fallback file (e.g.
/// `index.html`) served when the requested path is missing — useful for
/// single-page applications with client-side routing.
pub struct ServeDir {
    base_dir: PathBuf,
    fallback: Option<PathBuf>,
}

impl ServeDir {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            fallback: None,
        }
    }

    pub fn fallback(mut self, fallback: impl Into<PathBuf>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Resolves `req_path` against the base directory, rejecting any path that
    /// canonicalizes outside it (directory traversal via `..` or symlinks).
    fn sanitize_path(&self, req_path: &str) -> Option<PathBuf> {
        let rel_path = req_path.trim_start_matches('/');
        let joined = self.base_dir.join(rel_path);
        let canonical = joined.canonicalize().ok()?;
        let base_canonical = self.base_dir.canonicalize().ok()?;
        canonical.starts_with(base_canonical).then_some(canonical)
    }

    pub async fn handle(&self, req: &Request, res: &mut Response) -> Result<(), AppError> {
        let path = req.uri.path();

        let target = self
            .sanitize_path(path)
            .filter(|p| p.is_file())
            .or_else(|| self.fallback.clone());

        match target {
            Some(file_path) => res.file(&file_path).await,
            None => res.file(Path::new("")).await,
        }
    }
}

/// Serves one fixed file, regardless of the request path (favicons, robots.txt).
pub struct ServeFile {
    path: PathBuf,
}

impl ServeFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn handle(&self, res: &mut Response) -> Result<(), AppError> {
        res.file(&self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("palisade-static-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sanitize_path_resolves_a_file_inside_the_base_dir() {
        let base = scratch_dir();
        std::fs::write(base.join("logo.png"), b"png-bytes").unwrap();

        let serve_dir = ServeDir::new(&base);
        let resolved = serve_dir.sanitize_path("/logo.png").unwrap();
        assert_eq!(resolved, base.canonicalize().unwrap().join("logo.png"));

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn sanitize_path_rejects_directory_traversal() {
        let base = scratch_dir();
        std::fs::write(base.join("secret.txt"), b"top secret").unwrap();

        let serve_dir = ServeDir::new(base.join("public"));
        assert!(serve_dir.sanitize_path("/../secret.txt").is_none());

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn sanitize_path_rejects_a_missing_base_dir() {
        let serve_dir = ServeDir::new(std::env::temp_dir().join("palisade-static-test-missing"));
        assert!(serve_dir.sanitize_path("/anything").is_none());
    }

    #[test]
    fn sanitize_path_falls_back_to_the_configured_file_when_missing() {
        let base = scratch_dir();
        std::fs::write(base.join("index.html"), b"<html></html>").unwrap();

        let serve_dir = ServeDir::new(&base).fallback(base.join("index.html"));
        assert!(serve_dir.sanitize_path("/does-not-exist").is_none());
        assert_eq!(serve_dir.fallback, Some(base.join("index.html")));

        std::fs::remove_dir_all(&base).unwrap();
    }
}
