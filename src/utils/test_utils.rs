//! In-process HTTP stub used by the streaming and engine tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Gap between chunk writes so the client sees them as separate frames.
const CHUNK_GAP: Duration = Duration::from_millis(25);

enum StubBody {
    Json(String),
    Chunked(Vec<String>),
    /// Writes its chunks, then holds the connection open without finishing.
    Stalled(Vec<String>),
}

pub struct StubResponse {
    status: u16,
    body: StubBody,
}

impl StubResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: StubBody::Json(body.to_string()),
        }
    }

    pub fn chunked(status: u16, chunks: &[&str]) -> Self {
        Self {
            status,
            body: StubBody::Chunked(chunks.iter().map(|c| c.to_string()).collect()),
        }
    }

    pub fn stalled(status: u16, chunks: &[&str]) -> Self {
        Self {
            status,
            body: StubBody::Stalled(chunks.iter().map(|c| c.to_string()).collect()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub body: serde_json::Value,
}

pub struct StubServer {
    addr: SocketAddr,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl StubServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().await.clone()
    }
}

/// Client that never routes through a proxy from the environment.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("test client should build")
}

/// Serves `responses` in order, one per accepted connection.
pub async fn spawn_stub_server(responses: Vec<StubResponse>) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    let captured = Arc::new(Mutex::new(Vec::new()));
    let captured_for_server = Arc::clone(&captured);

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            match read_http_request(&mut stream).await {
                Ok(request) => captured_for_server.lock().await.push(request),
                Err(_) => return,
            }
            if write_response(&mut stream, response).await.is_err() {
                return;
            }
        }
    });

    StubServer { addr, captured }
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    let header_end = loop {
        if let Some(index) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break index + 4;
        }
        let read = stream.read(&mut chunk).await.map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines.next().ok_or("Missing HTTP request line")?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0_usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().map_err(|_| "Bad content-length")?;
            }
        }
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let read = stream.read(&mut chunk).await.map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    let body = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|err| err.to_string())?
    };

    Ok(CapturedRequest { method, path, body })
}

fn status_line(status: u16) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown");
    format!("HTTP/1.1 {status} {reason}\r\n")
}

async fn write_chunks(stream: &mut TcpStream, chunks: &[String]) -> std::io::Result<()> {
    for chunk in chunks {
        let data = format!("{chunk}\n");
        stream
            .write_all(format!("{:x}\r\n{}\r\n", data.len(), data).as_bytes())
            .await?;
        stream.flush().await?;
        tokio::time::sleep(CHUNK_GAP).await;
    }
    Ok(())
}

async fn write_response(stream: &mut TcpStream, response: StubResponse) -> std::io::Result<()> {
    let status = status_line(response.status);
    match response.body {
        StubBody::Json(body) => {
            let message = format!(
                "{status}content-type: application/json\r\nconnection: close\r\ncontent-length: {}\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(message.as_bytes()).await?;
        }
        StubBody::Chunked(chunks) => {
            let head = format!(
                "{status}content-type: application/json\r\nconnection: close\r\ntransfer-encoding: chunked\r\n\r\n"
            );
            stream.write_all(head.as_bytes()).await?;
            write_chunks(stream, &chunks).await?;
            stream.write_all(b"0\r\n\r\n").await?;
        }
        StubBody::Stalled(chunks) => {
            let head = format!(
                "{status}content-type: application/json\r\ntransfer-encoding: chunked\r\n\r\n"
            );
            stream.write_all(head.as_bytes()).await?;
            write_chunks(stream, &chunks).await?;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
    stream.flush().await?;
    stream.shutdown().await
}
