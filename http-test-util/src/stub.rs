//! A controllable target for driving load against.
//!
//! Routes:
//! - `GET /api/kategori` the category listing
//! - `GET /health`
//! - `GET /status/:code` an empty response with the given status
//! - `GET /delay/:ms` the category listing after sleeping `ms` milliseconds
//! - `GET /hang` never answers
use crate::{seed_categories, Category};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Counts requests that reached a handler.
#[derive(Clone, Default)]
pub struct HitCounter {
    count: Arc<AtomicU64>,
}

impl HitCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn hit(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

pub fn router(hits: HitCounter) -> Router {
    Router::new()
        .route("/api/kategori", get(list_categories))
        .route("/health", get(health))
        .route("/status/:code", get(status))
        .route("/delay/:ms", get(delay))
        .route("/hang", get(hang))
        .with_state(hits)
}

/// Serves the stub router on `addr` in a background task and returns the
/// bound address, so `127.0.0.1:0` yields an ephemeral port.
pub async fn spawn(addr: &str) -> anyhow::Result<(SocketAddr, HitCounter)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let hits = HitCounter::new();
    let app = router(hits.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("stub target stopped: {e}");
        }
    });
    Ok((local, hits))
}

async fn list_categories(State(hits): State<HitCounter>) -> Json<Vec<Category>> {
    hits.hit();
    Json(seed_categories())
}

async fn health(State(hits): State<HitCounter>) -> &'static str {
    hits.hit();
    "ok"
}

async fn status(State(hits): State<HitCounter>, Path(code): Path<u16>) -> StatusCode {
    hits.hit();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn delay(State(hits): State<HitCounter>, Path(ms): Path<u64>) -> Json<Vec<Category>> {
    hits.hit();
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(seed_categories())
}

async fn hang(State(hits): State<HitCounter>) -> &'static str {
    hits.hit();
    std::future::pending::<()>().await;
    "unreachable"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut tcp = TcpStream::connect(addr).await.unwrap();
        let req = format!("GET {path} HTTP/1.1\r\nHost: stub\r\nConnection: close\r\n\r\n");
        tcp.write_all(req.as_bytes()).await.unwrap();
        let mut out = String::new();
        tcp.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn serves_categories_and_counts_hits() {
        let (addr, hits) = spawn("127.0.0.1:0").await.unwrap();
        let resp = raw_get(addr, "/api/kategori").await;
        assert!(resp.starts_with("HTTP/1.1 200"));
        assert!(resp.contains("Indomie Godog"));
        assert_eq!(hits.get(), 1);
    }

    #[tokio::test]
    async fn echoes_requested_status() {
        let (addr, _hits) = spawn("127.0.0.1:0").await.unwrap();
        let resp = raw_get(addr, "/status/503").await;
        assert!(resp.starts_with("HTTP/1.1 503"));
    }
}
