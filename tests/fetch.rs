//! Media download cache behavior against a real HTTP endpoint.

mod common;

use beacon::content::{FetchCache, FetchError, FetchTicket};
use beacon::core::config::FetchConfig;
use common::spawn_http_server;
use std::time::Duration;

fn cache(dir: &tempfile::TempDir) -> FetchCache {
    FetchCache::new(&FetchConfig::default(), Some(dir.path().to_path_buf())).expect("fetch cache")
}

#[tokio::test]
async fn test_download_lands_in_cache_dir() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(&dir);
    let server = spawn_http_server(200, b"frames".to_vec(), Duration::ZERO).await;

    let key = FetchCache::cache_key("c1", Some("intro clip"), Some("mp4"));
    let ticket = cache.fetch(&key, &server.url);
    assert!(matches!(ticket, FetchTicket::Pending(_)));
    let path = FetchCache::wait(ticket).await.expect("download");

    assert_eq!(path, dir.path().join(&key));
    assert_eq!(std::fs::read(&path).unwrap(), b"frames");
    assert_eq!(server.hit_count(), 1);

    // The cached copy is reused without touching the network.
    let ticket = cache.fetch(&key, &server.url);
    assert!(matches!(ticket, FetchTicket::Cached(_)));
    assert_eq!(server.hit_count(), 1);
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_download() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(&dir);
    // The delay keeps the first transfer in flight while the second attaches.
    let server = spawn_http_server(200, b"shared".to_vec(), Duration::from_millis(200)).await;

    let key = FetchCache::cache_key("c2", None, None);
    let first = cache.fetch(&key, &server.url);
    let second = cache.fetch(&key, &server.url);

    let (a, b) = tokio::join!(FetchCache::wait(first), FetchCache::wait(second));
    let a = a.expect("first waiter");
    let b = b.expect("second waiter");
    assert_eq!(a, b);
    assert_eq!(server.hit_count(), 1);
}

#[tokio::test]
async fn test_http_error_status_is_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(&dir);
    let server = spawn_http_server(404, b"gone".to_vec(), Duration::ZERO).await;

    let key = FetchCache::cache_key("c3", None, None);
    let result = FetchCache::wait(cache.fetch(&key, &server.url)).await;
    assert!(matches!(result, Err(FetchError::Status(404))));

    // A failed transfer leaves no complete entry behind.
    assert!(cache.lookup(&key).map_or(true, |entry| !entry.complete));
}

#[tokio::test]
async fn test_unreachable_host_fails_without_panic() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache(&dir);
    let key = FetchCache::cache_key("c4", None, None);
    // Port 1 is never listening.
    let result = FetchCache::wait(cache.fetch(&key, "http://127.0.0.1:1/x.mp4")).await;
    assert!(matches!(result, Err(FetchError::Transfer(_))));
}

#[tokio::test]
async fn test_preexisting_file_counts_as_cached() {
    let dir = tempfile::tempdir().unwrap();
    let key = FetchCache::cache_key("c5", Some("promo"), None);
    std::fs::write(dir.path().join(&key), b"old frames").unwrap();
    let cache = cache(&dir);

    // URL is bogus; it must never be contacted.
    let ticket = cache.fetch(&key, "http://no-such-host.invalid/x.mp4");
    let path = FetchCache::wait(ticket).await.expect("cached path");
    assert_eq!(std::fs::read(path).unwrap(), b"old frames");
}
