//! Static document serving

use std::path::{Path, PathBuf};

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Serves a single HTML document at `/` and `/index.html`
#[derive(Debug, Clone)]
pub struct StaticDocument {
    path: PathBuf,
}

impl StaticDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve a request path. The document is re-read on every hit so edits
    /// show up without restarting the host.
    pub async fn serve(&self, path: &str) -> Response {
        match path {
            "/" | "/index.html" => match tokio::fs::read_to_string(&self.path).await {
                Ok(content) => serve_html(content),
                Err(e) => {
                    warn!("Failed to read {}: {}", self.path.display(), e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read document").into_response()
                }
            },
            _ => (StatusCode::NOT_FOUND, "Not found").into_response(),
        }
    }
}

fn serve_html(content: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        content,
    )
        .into_response()
}
