//! # HTTP Serving Module
//!
//! A small HTTP/1.1 responder on top of a tokio `TcpListener` that serves the
//! latest generated KML document.
//!
//! ## Routes
//! - `GET /`: landing page linking to the document.
//! - `GET /kml`: the current document as `application/vnd.google-earth.kml+xml`,
//!   or `404` until the first refresh succeeds.
//!
//! `HEAD` is accepted on both routes. Any other method gets `405`.
//!
//! ## Components
//! - `listen`: accept loop, one task per connection.
//! - `handle_stream`: keep-alive loop for a single connection.
//! - `collect_http`: reads a request up to the end of its headers and body.
//! - `get_route`: extracts method and path from the request line.
use crate::config::Config;
use crate::error::StoreError;
use crate::kml::KML_CONTENT_TYPE;
use crate::store::DocumentStore;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::{timeout, Duration};

pub const KML_FILE_NAME: &str = "nggmrs_repeaters.kml";

pub const LANDING_PAGE: &str = "<h2>NGGMRS Repeater KML Service</h2>\
<p>Download the latest KML file: <a href=\"/kml\">nggmrs_repeaters.kml</a></p>";

const MAX_PAYLOAD_SIZE: usize = 1024 * 1024; // 1 MB

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Landing,
    Kml,
    Unknown,
}

fn get_target(path: &str) -> Route {
    let path = path.split(['?', '#']).next().unwrap_or("");
    match path {
        "/" | "" => Route::Landing,
        "/kml" => Route::Kml,
        _ => Route::Unknown,
    }
}

/// Reads from the stream until the end of the headers or the end of the body if the Content-Length
/// header is present. The data is collected into the buffer, which may already hold bytes left
/// over from a previous request. Returns the length of the first complete request in the buffer;
/// anything after it belongs to the next request.
pub async fn collect_http<S>(stream: &mut S, buffer: &mut Vec<u8>) -> Result<usize, std::io::Error>
where
    S: AsyncRead + Unpin + Send,
{
    const TEMP_BUFFER_SIZE: usize = 1024;
    let mut temp_buffer = [0; TEMP_BUFFER_SIZE];

    loop {
        if let Some(request_len) = complete_request_len(buffer)? {
            return Ok(request_len);
        }

        if buffer.len() > MAX_PAYLOAD_SIZE {
            return Err(payload_too_large());
        }

        let n = stream.read(&mut temp_buffer).await?;
        if n == 0 {
            if find_headers_end(buffer).is_none() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Stream closed",
                ));
            }
            // peer closed mid-body, serve what arrived
            return Ok(buffer.len());
        }

        buffer.extend_from_slice(&temp_buffer[..n]);
    }
}

fn payload_too_large() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, "Payload too large")
}

/// Offset just past the blank line that ends the headers.
fn find_headers_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Length of the first request in `buffer` once it has fully arrived.
/// A declared body larger than `MAX_PAYLOAD_SIZE` is rejected up front.
fn complete_request_len(buffer: &[u8]) -> Result<Option<usize>, std::io::Error> {
    let headers_end = match find_headers_end(buffer) {
        Some(end) => end,
        None => return Ok(None),
    };

    let content_length = parse_content_length(&buffer[..headers_end]).unwrap_or(0);
    if content_length > MAX_PAYLOAD_SIZE {
        return Err(payload_too_large());
    }

    let request_len = headers_end + content_length;
    Ok((buffer.len() >= request_len).then_some(request_len))
}

/// Parses the `Content-Length` header from the given headers.
/// Returns `None` if the header is missing or invalid.
fn parse_content_length(headers: &[u8]) -> Option<usize> {
    header_value(headers, "content-length").and_then(|v| v.parse::<usize>().ok())
}

fn header_value(headers: &[u8], name: &str) -> Option<String> {
    let headers_str = std::str::from_utf8(headers).ok()?;
    headers_str.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

/// `true` when the client asked us to drop the connection after this response.
fn wants_close(request: &[u8]) -> bool {
    header_value(request, "connection")
        .map(|v| v.eq_ignore_ascii_case("close"))
        .unwrap_or(false)
}

// without host
pub fn get_route(buffer: &[u8]) -> Option<(String, String)> {
    let buffer_str = std::str::from_utf8(buffer).ok()?;
    let request_line = buffer_str.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    let version = parts.next()?;

    let is_method_token = method.bytes().all(|b| b.is_ascii_uppercase() || b == b'-');
    if is_method_token && version.starts_with("HTTP/") {
        Some((method.to_string(), path.to_string()))
    } else {
        None
    }
}

struct Response<'a> {
    status: &'static str,
    content_type: &'static str,
    extra_headers: &'a [(&'static str, String)],
    body: &'a [u8],
}

async fn write_response<S>(
    client_stream: &mut S,
    response: Response<'_>,
    head_only: bool,
    keep_alive: bool,
) -> Result<(), std::io::Error>
where
    S: AsyncWrite + Unpin + Send,
{
    let mut header = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: {}\r\n",
        response.status,
        response.content_type,
        response.body.len(),
        if keep_alive { "keep-alive" } else { "close" },
    );
    for (key, value) in response.extra_headers {
        header.push_str(&format!("{}: {}\r\n", key, value));
    }
    header.push_str("\r\n");

    client_stream.write_all(header.as_bytes()).await?;
    if !head_only {
        client_stream.write_all(response.body).await?;
    }
    client_stream.flush().await
}

pub async fn respond_with_bad_request<S>(client_stream: &mut S) -> Result<(), std::io::Error>
where
    S: AsyncWrite + Unpin + Send,
{
    let response = "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    client_stream.write_all(response.as_bytes()).await
}

/// Serves one request. Returns whether the connection may stay open.
async fn respond<S>(
    client_stream: &mut S,
    request: &[u8],
    store: &DocumentStore,
) -> Result<bool, std::io::Error>
where
    S: AsyncWrite + Unpin + Send,
{
    let (method, path) = match get_route(request) {
        Some(route) => route,
        None => {
            respond_with_bad_request(client_stream).await?;
            return Ok(false);
        }
    };
    let keep_alive = !wants_close(request);
    log::debug!("{} {}", method, path);

    if method != "GET" && method != "HEAD" {
        let response = Response {
            status: "405 Method Not Allowed",
            content_type: "text/plain; charset=utf-8",
            extra_headers: &[("Allow", "GET, HEAD".to_string())],
            body: b"Method not allowed.",
        };
        write_response(client_stream, response, false, keep_alive).await?;
        return Ok(keep_alive);
    }
    let head_only = method == "HEAD";

    match get_target(&path) {
        Route::Landing => {
            let response = Response {
                status: "200 OK",
                content_type: "text/html; charset=utf-8",
                extra_headers: &[],
                body: LANDING_PAGE.as_bytes(),
            };
            write_response(client_stream, response, head_only, keep_alive).await?;
        }
        Route::Kml => match store.current() {
            Ok(snapshot) => {
                let headers = [
                    (
                        "Content-Disposition",
                        format!("inline; filename=\"{}\"", KML_FILE_NAME),
                    ),
                    (
                        "Last-Modified",
                        snapshot
                            .built_at
                            .format("%a, %d %b %Y %H:%M:%S GMT")
                            .to_string(),
                    ),
                ];
                let response = Response {
                    status: "200 OK",
                    content_type: KML_CONTENT_TYPE,
                    extra_headers: &headers,
                    body: snapshot.kml.as_bytes(),
                };
                write_response(client_stream, response, head_only, keep_alive).await?;
            }
            Err(StoreError::NotYetAvailable) => {
                let message = StoreError::NotYetAvailable.to_string();
                let response = Response {
                    status: "404 Not Found",
                    content_type: "text/plain; charset=utf-8",
                    extra_headers: &[],
                    body: message.as_bytes(),
                };
                write_response(client_stream, response, head_only, keep_alive).await?;
            }
        },
        Route::Unknown => {
            let response = Response {
                status: "404 Not Found",
                content_type: "text/plain; charset=utf-8",
                extra_headers: &[],
                body: b"Not found.",
            };
            write_response(client_stream, response, head_only, keep_alive).await?;
        }
    }

    Ok(keep_alive)
}

/// Outer loop to handle multiple HTTP requests from the same stream
pub async fn handle_stream<S>(
    mut client_stream: S,
    store: Arc<DocumentStore>,
    config: Arc<Config>,
) -> Result<(), std::io::Error>
where
    S: AsyncWrite + AsyncRead + Unpin + Send,
{
    // bytes read past the end of the previous request
    let mut pending = Vec::new();
    loop {
        match timeout(
            Duration::from_secs(config.tcp_keepalive_time_sec),
            collect_http(&mut client_stream, &mut pending),
        )
        .await
        {
            Ok(Ok(request_len)) => {
                let req_buf: Vec<u8> = pending.drain(..request_len).collect();
                if !respond(&mut client_stream, &req_buf, &store).await? {
                    break;
                }
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Ok(Err(e)) => {
                log::warn!("Error reading request from client stream: {}", e);
                break;
            }
            Err(_) => {
                log::debug!("Closing stream after keepalive timeout");
                break;
            }
        }
    }

    // peer may already be gone
    let _ = client_stream.shutdown().await;
    Ok(())
}

/// Accepts connections until `shutdown` flips to `true`.
pub async fn listen(
    store: Arc<DocumentStore>,
    config: Arc<Config>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    log::info!("HTTP Listening on: {}", listener.local_addr()?);
    serve(listener, store, config, &mut shutdown).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    store: Arc<DocumentStore>,
    config: Arc<Config>,
    shutdown: &mut watch::Receiver<bool>,
) {
    loop {
        let raw_stream = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    log::warn!("Error accepting connection: {}", e);
                    continue;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        let store = Arc::clone(&store);
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            if let Err(e) = handle_stream(raw_stream, store, config).await {
                log::warn!("Handle Stream Error: {}", e);
            }
        });
    }
    log::info!("HTTP listener stopped");
}
