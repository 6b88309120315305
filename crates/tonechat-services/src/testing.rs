//! Canned HTTP server for exercising the clients against real sockets.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the server does with one connection.
pub enum Canned {
    /// Answer with this status and JSON body, then close.
    Respond(u16, String),
    /// Read the request and never answer.
    Stall,
}

impl Canned {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Canned::Respond(status, body.to_string())
    }
}

/// Serve `replies` in order, one per accepted connection. Returns the base
/// URL, e.g. `http://127.0.0.1:40123`.
pub async fn serve(replies: Vec<Canned>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for reply in replies {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(answer(socket, reply));
        }
    });
    format!("http://{}", addr)
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn answer(mut socket: TcpStream, reply: Canned) {
    read_request(&mut socket).await;
    match reply {
        Canned::Respond(status, body) => {
            let response = format!(
                "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        Canned::Stall => {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    }
}

/// Consume headers and a `content-length` body.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            return;
        }
    }
}
