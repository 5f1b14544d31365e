//! Local HTTP server for code packages

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Default)]
struct PackageStore {
    packages: DashMap<String, Bytes>,
    requests: AtomicUsize,
}

/// Serves `<name>.zip` packages at `http://127.0.0.1:<port>/packages/<name>.zip`.
///
/// Files that were never added answer 404. The server stops when dropped.
pub struct PackageServer {
    addr: SocketAddr,
    store: Arc<PackageStore>,
    handle: JoinHandle<()>,
}

impl PackageServer {
    /// Start on a random free port
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let store = Arc::new(PackageStore::default());

        let router = Router::new()
            .route("/packages/:file", get(serve_package))
            .with_state(store.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "Package server stopped");
            }
        });

        info!(%addr, "Started package server");
        Ok(Self {
            addr,
            store,
            handle,
        })
    }

    /// Base URL that `<name>.zip` can be appended to
    pub fn url(&self) -> String {
        format!("http://{}/packages", self.addr)
    }

    /// URL of one package file
    pub fn package_url(&self, file: &str) -> String {
        format!("{}/{file}", self.url())
    }

    pub fn add(&self, file: impl Into<String>, body: impl Into<Bytes>) {
        self.store.packages.insert(file.into(), body.into());
    }

    /// Number of requests served, including 404s
    pub fn request_count(&self) -> usize {
        self.store.requests.load(Ordering::SeqCst)
    }
}

impl Drop for PackageServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_package(
    State(store): State<Arc<PackageStore>>,
    Path(file): Path<String>,
) -> Response {
    store.requests.fetch_add(1, Ordering::SeqCst);
    match store.packages.get(&file) {
        Some(body) => (StatusCode::OK, body.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
