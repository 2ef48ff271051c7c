//! High-level server wrapper over axum.
//!
//! Routers are contributed incrementally (control API, media routes) before
//! `start()`; the server then listens on all interfaces so LAN endpoints
//! can pull media, and shuts down gracefully on Ctrl+C or token
//! cancellation.

use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Serializable server facts.
#[derive(Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub base_url: String,
    pub http_port: u16,
}

pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    shutdown_token: CancellationToken,
}

impl Server {
    /// # Arguments
    ///
    /// * `name` - server name (for logs)
    /// * `base_url` - address the media URLs are built from (host or URL)
    /// * `http_port` - HTTP port to listen on
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        let base_router = Router::new().fallback(global_fallback);
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            router: Arc::new(RwLock::new(base_router)),
            join_handle: None,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token observed by long-lived components that must wind down with
    /// the server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Adds a sub-router: merged at "/" or nested under the given path.
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(sub_router)
        } else {
            let normalized = format!("/{}", path.trim_start_matches('/'));
            std::mem::take(&mut *r).nest(&normalized, sub_router)
        };
    }

    /// Starts listening. Returns once the listener task is spawned; use
    /// [`Server::wait`] to block until shutdown.
    pub async fn start(&mut self) {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        info!(
            "Server {} listening on {} (base {})",
            self.name,
            addr,
            self.base_url()
        );

        let router = self.router.clone();
        let shutdown_token = self.shutdown_token.clone();

        self.join_handle = Some(tokio::spawn(async move {
            let r = router.read().await.clone();
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Cannot bind {}: {}", addr, e);
                    shutdown_token.cancel();
                    return;
                }
            };

            let shutdown = {
                let token = shutdown_token.clone();
                async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = signal::ctrl_c() => {
                            info!("Ctrl+C received, shutting down");
                            token.cancel();
                        }
                    }
                }
            };

            let serve = axum::serve(listener, r.into_make_service())
                .with_graceful_shutdown(shutdown);
            if let Err(e) = serve.await {
                error!("HTTP server stopped with error: {}", e);
            } else {
                info!("HTTP server stopped");
            }
        }));
    }

    /// Waits for the server task to finish.
    pub async fn wait(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            if let Err(e) = handle.await {
                warn!("Server task join error: {}", e);
            }
        }
    }

    /// Full base URL (scheme + host + port), normalizing a configured value
    /// that may omit either.
    pub fn base_url(&self) -> String {
        let mut base = self.base_url.trim_end_matches('/').to_string();

        if !base.contains("://") {
            base = format!("http://{}", base);
        }

        let has_port = base
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse::<u16>().ok())
            .is_some();

        if has_port {
            base
        } else {
            format!("{}:{}", base, self.http_port)
        }
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            base_url: self.base_url(),
            http_port: self.http_port,
        }
    }
}

/// Permissive CORS headers; cast endpoints preflight media pulls.
pub fn cors_headers() -> [(header::HeaderName, &'static str); 4] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            "GET, HEAD, OPTIONS",
        ),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            "Range, Content-Type",
        ),
        (
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            "Content-Range, Content-Length, Accept-Ranges",
        ),
    ]
}

/// OPTIONS answer used both by the global fallback and by routes that only
/// register other methods (axum would answer 405 for them otherwise).
pub async fn preflight() -> Response {
    (StatusCode::OK, cors_headers()).into_response()
}

/// CORS preflights succeed anywhere in the tree; everything else unknown is
/// a plain 404.
async fn global_fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        preflight().await
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_adds_scheme_and_port() {
        let server = Server::new("t", "192.168.0.10", 9876);
        assert_eq!(server.base_url(), "http://192.168.0.10:9876");
    }

    #[test]
    fn base_url_keeps_explicit_port() {
        let server = Server::new("t", "http://192.168.0.10:8080", 9876);
        assert_eq!(server.base_url(), "http://192.168.0.10:8080");
    }
}
