//! Shared fixtures for unit tests: a minimal HTTP responder and in-memory
//! archive builders. Compiled only for tests.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A one-endpoint HTTP server backed by a raw `TcpListener`.
///
/// Serves the same canned status and body for every request, tracks request
/// counts and peak connection concurrency, and shuts down when dropped (the
/// accept task exits once the runtime drops it).
pub(crate) struct TestServer {
    addr: std::net::SocketAddr,
    hits: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl TestServer {
    pub(crate) async fn spawn(status: u16, body: Vec<u8>) -> Self {
        Self::spawn_with_delay(status, body, Duration::ZERO).await
    }

    /// Like [`spawn`](Self::spawn), but holds each response open for `delay`
    /// before replying, so tests can observe concurrent connections.
    pub(crate) async fn spawn_with_delay(status: u16, body: Vec<u8>, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let server = Self {
            addr,
            hits: hits.clone(),
            active: active.clone(),
            max_active: max_active.clone(),
        };

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let hits = hits.clone();
                let active = active.clone();
                let max_active = max_active.clone();
                let body = body.clone();

                tokio::spawn(async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now_active, Ordering::SeqCst);

                    handle_connection(stream, status, &body, delay).await;

                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        server
    }

    pub(crate) fn url(&self) -> String {
        format!("http://{}/asset.archive", self.addr)
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    status: u16,
    body: &[u8],
    delay: Duration,
) {
    // Read until the end of the request headers; the tests only issue GETs.
    let mut buf = [0u8; 4096];
    let mut request = Vec::new();
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(_) => return,
        }
    }

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    };
    let header = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes()).await;
    let _ = stream.write_all(body).await;
    let _ = stream.flush().await;
}

/// Builds a zip archive in memory from `(path, contents)` pairs.
pub(crate) fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// Builds a tar.gz archive in memory from `(path, contents)` pairs.
pub(crate) fn tar_gz_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
