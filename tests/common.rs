//! Common test harness utilities for integration tests.
//!
//! This module provides helpers for:
//! - A minimal single-route HTTP server for download tests
//! - A recording presentation surface
//! - Building test identities and fixtures
//!
//! All helpers use only existing dev-dependencies.

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use beacon::content::{DisplayRequest, PresentationSurface};
use beacon::core::identity::DeviceIdentity;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

/// Fixed test identity.
pub fn test_identity() -> DeviceIdentity {
    DeviceIdentity {
        device_id: "device_cafe0001".into(),
        client_id: "agent_cafe0001".into(),
    }
}

/// Surface that records every instruction it receives.
#[derive(Default)]
pub struct RecordingSurface {
    pub displayed: Mutex<Vec<DisplayRequest>>,
    pub notices: Mutex<Vec<(String, String)>>,
}

impl RecordingSurface {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl PresentationSurface for RecordingSurface {
    fn display_content(&self, request: DisplayRequest) {
        self.displayed.lock().push(request);
    }

    fn show_notice(&self, message: &str, level: &str) {
        self.notices.lock().push((message.into(), level.into()));
    }
}

/// Minimal HTTP server answering every request with one canned response.
/// Counts connections so tests can assert how many downloads actually ran.
pub struct TestHttpServer {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TestHttpServer {
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a server that responds with `status` and `body` after `delay`.
pub async fn spawn_http_server(status: u16, body: Vec<u8>, delay: Duration) -> TestHttpServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_counter = hits.clone();

    let task = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            hits_counter.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            tokio::spawn(async move {
                // Drain the request head before answering.
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                tokio::time::sleep(delay).await;
                let reason = if status == 200 { "OK" } else { "Error" };
                let head = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes()).await;
                let _ = stream.write_all(&body).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    TestHttpServer {
        url: format!("http://{addr}/media.mp4"),
        hits,
        task,
    }
}
