//! Minimal HTTP/1.1 server for behaviors wiremock cannot express: counting
//! simultaneous requests, cutting or stalling a body, and trickling one out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the server does with every request.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Waits `delay`, then answers 200 with `body`.
    Slow { delay: Duration, body: Vec<u8> },
    /// Declares `declared` bytes, sends `sent`, then closes the connection.
    Truncated { declared: usize, sent: Vec<u8> },
    /// Declares `declared` bytes, sends `sent`, then keeps the connection
    /// open without sending anything else.
    Stalled { declared: usize, sent: Vec<u8> },
    /// Sends `chunks` blocks of `chunk_size` bytes, pausing `gap` after each.
    Trickle {
        chunk_size: usize,
        chunks: usize,
        gap: Duration,
    },
}

pub struct RawServer {
    addr: SocketAddr,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl RawServer {
    /// Starts the server, or `None` when localhost sockets are unavailable.
    pub async fn start(behavior: Behavior) -> Option<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await.ok()?;
        let addr = listener.local_addr().ok()?;
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let counters = (Arc::clone(&in_flight), Arc::clone(&max_in_flight));
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let behavior = behavior.clone();
                let (in_flight, max_in_flight) = (Arc::clone(&counters.0), Arc::clone(&counters.1));
                tokio::spawn(async move {
                    let _ = serve(stream, &behavior, &in_flight, &max_in_flight).await;
                });
            }
        });

        Some(Self {
            addr,
            in_flight,
            max_in_flight,
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Highest number of requests being answered at the same moment.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for RawServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    behavior: &Behavior,
    in_flight: &AtomicUsize,
    max_in_flight: &AtomicUsize,
) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0_u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    max_in_flight.fetch_max(now, Ordering::SeqCst);

    let result = match behavior {
        Behavior::Slow { delay, body } => {
            tokio::time::sleep(*delay).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                body.len()
            );
            write_response(&mut stream, head.as_bytes(), body).await
        }
        Behavior::Truncated { declared, sent } => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"
            );
            write_response(&mut stream, head.as_bytes(), sent).await
        }
        Behavior::Stalled { declared, sent } => {
            let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\n\r\n");
            let result = write_response(&mut stream, head.as_bytes(), sent).await;
            tokio::time::sleep(Duration::from_secs(60)).await;
            result
        }
        Behavior::Trickle {
            chunk_size,
            chunks,
            gap,
        } => trickle(&mut stream, *chunk_size, *chunks, *gap).await,
    };

    in_flight.fetch_sub(1, Ordering::SeqCst);
    result?;
    stream.shutdown().await
}

async fn trickle(
    stream: &mut TcpStream,
    chunk_size: usize,
    chunks: usize,
    gap: Duration,
) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        chunk_size * chunks
    );
    stream.write_all(head.as_bytes()).await?;
    let block = vec![b't'; chunk_size];
    for _ in 0..chunks {
        stream.write_all(&block).await?;
        tokio::time::sleep(gap).await;
    }
    stream.flush().await
}

async fn write_response(stream: &mut TcpStream, head: &[u8], body: &[u8]) -> std::io::Result<()> {
    stream.write_all(head).await?;
    stream.write_all(body).await?;
    stream.flush().await
}
