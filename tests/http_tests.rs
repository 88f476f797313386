use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use repeater_kml::{config, http, kml, DocumentStore, NodeRecord};

fn test_config() -> Arc<config::Config> {
    Arc::new(config::Config {
        http_host: "127.0.0.1".into(),
        http_port: 0,
        tcp_keepalive_time_sec: 1,
        ..config::Config::default()
    })
}

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn populated_store() -> Arc<DocumentStore> {
    let store = Arc::new(DocumentStore::new());
    let records = vec![NodeRecord {
        name: Some("R1".into()),
        description: Some("146.520".into()),
        latitude: Some(40.0),
        longitude: Some(-105.0),
        keyed: "1".into(),
        last_report: 1_700_000_000,
        hidden: false,
    }];
    store.replace(kml::build(&records, now()), now());
    store
}

/// Sends a single request with `Connection: close` and returns the whole response.
async fn exchange(store: Arc<DocumentStore>, request: &str) -> String {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let handle = tokio::spawn(http::handle_stream(server, store, test_config()));

    client.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    handle.await.unwrap().unwrap();

    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn landing_page_links_to_kml() {
    let response = exchange(
        Arc::new(DocumentStore::new()),
        "GET / HTTP/1.1\r\nHost: local\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: text/html; charset=utf-8\r\n"));
    assert!(response.contains("<a href=\"/kml\">nggmrs_repeaters.kml</a>"));
}

#[tokio::test]
async fn kml_before_first_refresh_is_not_found() {
    let response = exchange(
        Arc::new(DocumentStore::new()),
        "GET /kml HTTP/1.1\r\nHost: local\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.ends_with("KML file not yet generated."));
}

#[tokio::test]
async fn serves_current_kml() {
    let store = populated_store();
    let expected = store.current().unwrap().kml.clone();

    let response = exchange(
        store,
        "GET /kml HTTP/1.1\r\nHost: local\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: application/vnd.google-earth.kml+xml\r\n"));
    assert!(response.contains(&format!("Content-Length: {}\r\n", expected.len())));
    assert!(response.contains("Content-Disposition: inline; filename=\"nggmrs_repeaters.kml\"\r\n"));
    assert!(response.contains("Last-Modified: Tue, 14 Nov 2023 22:13:20 GMT\r\n"));
    assert!(response.ends_with(&expected));
}

#[tokio::test]
async fn head_returns_headers_only() {
    let response = exchange(
        populated_store(),
        "HEAD /kml HTTP/1.1\r\nHost: local\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("\r\n\r\n"));
    assert!(!response.contains("<kml"));
}

#[tokio::test]
async fn unknown_path_and_method() {
    let not_found = exchange(
        populated_store(),
        "GET /nodes HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(not_found.starts_with("HTTP/1.1 404 Not Found\r\n"));

    let not_allowed = exchange(
        populated_store(),
        "POST /kml HTTP/1.1\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
    )
    .await;
    assert!(not_allowed.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
    assert!(not_allowed.contains("Allow: GET, HEAD\r\n"));

    let unlisted = exchange(
        populated_store(),
        "TRACE / HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(unlisted.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
}

#[tokio::test]
async fn pipelined_requests_are_both_answered() {
    let response = tokio::time::timeout(
        std::time::Duration::from_millis(500),
        exchange(
            populated_store(),
            "GET / HTTP/1.1\r\nHost: local\r\n\r\nGET /kml HTTP/1.1\r\nHost: local\r\nConnection: close\r\n\r\n",
        ),
    )
    .await
    .expect("second request should not wait for the keepalive timeout");

    assert_eq!(response.matches("HTTP/1.1 200 OK\r\n").count(), 2);
    assert!(response.contains("<a href=\"/kml\">"));
    assert!(response.contains("<name>R1</name>"));
}

#[tokio::test]
async fn garbage_request_is_bad_request() {
    let response = exchange(populated_store(), "hello there\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn keep_alive_serves_multiple_requests() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let handle = tokio::spawn(http::handle_stream(server, populated_store(), test_config()));

    client
        .write_all(b"GET / HTTP/1.1\r\nHost: local\r\n\r\n")
        .await
        .unwrap();
    let mut first = Vec::new();
    while !first.ends_with(b"</p>") {
        let mut chunk = [0u8; 1024];
        let n = client.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before the first response completed");
        first.extend_from_slice(&chunk[..n]);
    }
    let first = String::from_utf8(first).unwrap();
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(first.contains("Connection: keep-alive\r\n"));

    client
        .write_all(b"GET /kml HTTP/1.1\r\nHost: local\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut second = String::new();
    client.read_to_string(&mut second).await.unwrap();
    handle.await.unwrap().unwrap();

    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(second.contains("Connection: close\r\n"));
    assert!(second.contains("<name>R1</name>"));
}

#[tokio::test]
async fn listener_serves_swapped_document_and_stops_on_shutdown() {
    let store = Arc::new(DocumentStore::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let server = tokio::spawn({
        let store = store.clone();
        async move { http::serve(listener, store, test_config(), &mut shutdown_rx).await }
    });

    let get_kml = move || async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /kml HTTP/1.1\r\nHost: local\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    };

    assert!(get_kml().await.starts_with("HTTP/1.1 404"));

    store.replace(kml::build(&[], now()), now());
    let response = get_kml().await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("<Style id=\"repeaterStyle\">"));

    shutdown_tx.send(true).unwrap();
    server.await.unwrap();
}
