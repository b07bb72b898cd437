//! End-to-end tests for the proxy data path.

use ferry::config::CacheConfig;
use tokio::net::TcpListener;

mod common;

use common::{roundtrip, start_proxy, start_proxy_with_cache, MockOrigin};

fn get_request(addr: std::net::SocketAddr, path: &str) -> Vec<u8> {
    format!(
        "GET http://{}{} HTTP/1.1\r\nHost: {}\r\n\r\n",
        addr, path, addr
    )
    .into_bytes()
}

#[tokio::test]
async fn test_forwarded_response_matches_origin_bytes() {
    let origin = MockOrigin::start(vec![b'x'; 500]).await;
    let proxy = start_proxy().await;

    let response = roundtrip(proxy.addr, &get_request(origin.addr, "/resource")).await;
    assert_eq!(response, origin.expected_response());
    assert_eq!(origin.connection_count(), 1);

    proxy.stop().await;
}

#[tokio::test]
async fn test_second_identical_request_served_from_cache() {
    let origin = MockOrigin::start(vec![b'y'; 500]).await;
    let proxy = start_proxy().await;
    let request = get_request(origin.addr, "/cached");

    let first = roundtrip(proxy.addr, &request).await;
    assert_eq!(first, origin.expected_response());
    assert_eq!(origin.connection_count(), 1);

    let second = roundtrip(proxy.addr, &request).await;
    assert_eq!(second, first);
    // No new origin connection: the cache answered.
    assert_eq!(origin.connection_count(), 1);

    proxy.stop().await;
}

#[tokio::test]
async fn test_different_targets_are_cached_separately() {
    let origin = MockOrigin::start(b"shared body".to_vec()).await;
    let proxy = start_proxy().await;

    roundtrip(proxy.addr, &get_request(origin.addr, "/a")).await;
    roundtrip(proxy.addr, &get_request(origin.addr, "/b")).await;
    assert_eq!(origin.connection_count(), 2);

    // Replays of both targets now come from the cache.
    roundtrip(proxy.addr, &get_request(origin.addr, "/a")).await;
    roundtrip(proxy.addr, &get_request(origin.addr, "/b")).await;
    assert_eq!(origin.connection_count(), 2);

    proxy.stop().await;
}

#[tokio::test]
async fn test_oversize_response_is_served_but_not_cached() {
    let origin = MockOrigin::start(vec![b'z'; 500]).await;
    let proxy = start_proxy_with_cache(CacheConfig {
        max_cache_bytes: 1_049_000,
        max_object_bytes: 100,
        slots: 16,
    })
    .await;
    let request = get_request(origin.addr, "/big");

    let first = roundtrip(proxy.addr, &request).await;
    assert_eq!(first, origin.expected_response());

    let second = roundtrip(proxy.addr, &request).await;
    assert_eq!(second, first);
    // Admission was refused, so the origin was contacted both times.
    assert_eq!(origin.connection_count(), 2);

    proxy.stop().await;
}

#[tokio::test]
async fn test_malformed_request_is_rejected_without_upstream_contact() {
    let origin = MockOrigin::start(b"never served".to_vec()).await;
    let proxy = start_proxy().await;

    // Wrong scheme: rejected outright, connection closed with no bytes.
    let response = roundtrip(proxy.addr, b"POST ftp://bad HTTP/1.1\r\n\r\n").await;
    assert!(response.is_empty());

    // Missing version token, target pointing at a live origin: still
    // rejected before any upstream connection is made.
    let no_version = format!("GET http://{}/x\r\n\r\n", origin.addr).into_bytes();
    let response = roundtrip(proxy.addr, &no_version).await;
    assert!(response.is_empty());
    assert_eq!(origin.connection_count(), 0);

    proxy.stop().await;
}

#[tokio::test]
async fn test_unreachable_origin_yields_bad_gateway() {
    // Bind then drop so the port is closed.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);

    let proxy = start_proxy().await;
    let response = roundtrip(proxy.addr, &get_request(dead_addr, "/")).await;
    assert!(
        response.starts_with(b"HTTP/1.0 502 Bad Gateway\r\n"),
        "unexpected response: {:?}",
        String::from_utf8_lossy(&response)
    );

    proxy.stop().await;
}

#[tokio::test]
async fn test_access_log_records_each_parsed_request() {
    let origin = MockOrigin::start(b"logged".to_vec()).await;
    let proxy = start_proxy().await;
    let request = get_request(origin.addr, "/seen");

    roundtrip(proxy.addr, &request).await;
    roundtrip(proxy.addr, &request).await; // cache hit, still logged

    let log_path = proxy.log_path.clone();
    proxy.stop().await;

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let target = format!("http://{}/seen", origin.addr);
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let (timestamp, url) = line.split_once(": ").unwrap();
        assert!(timestamp.parse::<i64>().is_ok());
        assert_eq!(url, target);
    }

    let _ = std::fs::remove_file(&log_path);
}

#[tokio::test]
async fn test_concurrent_clients_make_independent_progress() {
    let origin = MockOrigin::start(vec![b'c'; 200]).await;
    let proxy = start_proxy().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let addr = proxy.addr;
        let request = get_request(origin.addr, &format!("/client-{}", i));
        handles.push(tokio::spawn(
            async move { roundtrip(addr, &request).await },
        ));
    }

    let expected = origin.expected_response();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), expected);
    }

    proxy.stop().await;
}
