//! Scripted HTTP server for stream tests.
//!
//! Every accepted connection reads the request head, records it, then plays
//! the script and closes the socket.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One step of a connection script.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Write(Vec<u8>),
    Sleep(Duration),
}

impl Step {
    pub(crate) fn write(chunk: impl Into<String>) -> Self {
        Self::Write(chunk.into().into_bytes())
    }

    /// Write bytes that need not be valid UTF-8.
    pub(crate) fn bytes(chunk: impl Into<Vec<u8>>) -> Self {
        Self::Write(chunk.into())
    }
}

/// Response head for a close-delimited event stream.
pub(crate) fn sse_head() -> &'static str {
    "HTTP/1.1 200 OK\r\n\
     Content-Type: text/event-stream\r\n\
     Cache-Control: no-cache\r\n\
     Connection: close\r\n\r\n"
}

/// Concatenate frames into one chunk.
pub(crate) fn frames(frames: impl IntoIterator<Item = String>) -> String {
    frames.into_iter().collect()
}

pub(crate) struct TestServer {
    addr: std::net::SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    accept: JoinHandle<()>,
}

impl TestServer {
    pub(crate) async fn start(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(script);

        let accept = {
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    tokio::spawn(serve(socket, script.clone(), requests.clone()));
                }
            })
        };

        Self {
            addr,
            requests,
            accept,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn serve(mut socket: TcpStream, script: Arc<Vec<Step>>, requests: Arc<Mutex<Vec<String>>>) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    requests.lock().push(String::from_utf8_lossy(&head).into_owned());

    for step in script.iter() {
        match step {
            Step::Write(chunk) => {
                if socket.write_all(chunk).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
            Step::Sleep(duration) => tokio::time::sleep(*duration).await,
        }
    }
    let _ = socket.shutdown().await;
}
