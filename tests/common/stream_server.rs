//! Minimal HTTP/1.1 server for exercising download streams.
//!
//! Routes:
//! - `/stream`: 200 with a large body, written in small paced writes until
//!   the client goes away.
//! - `/small`: 200 with a [`SMALL_LEN`]-byte body, sent at once.
//! - `/fail`: 500 with no body.
//! - `/stall`: 200 headers, then nothing.
//!
//! Plus a stand-in for the provider's discovery endpoints:
//! - `/`: landing page referencing `/app-test.js`.
//! - `/app-test.js`: script carrying [`TOKEN`].
//! - `/netflix/speedtest`: JSON list of `urlCount` `/small` URLs, 403 without
//!   the right token.
//! - `/slow/netflix/speedtest`: stalls like `/stall`.
//! - `/broken/netflix/speedtest`: 500.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

const BODY_LEN: usize = 256 * 1024 * 1024;
const WRITE_SIZE: usize = 16 * 1024;
pub const SMALL_LEN: usize = 300 * 1024 + 17;
const WRITE_PAUSE: Duration = Duration::from_millis(1);
pub const TOKEN: &str = "dGVzdHRva2Vu";

/// Starts a server in a background thread and returns its base URL
/// (e.g. "http://127.0.0.1:12345/"). The server runs until the process exits.
pub fn start() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || handle(stream, port));
        }
    });
    format!("http://127.0.0.1:{}/", port)
}

/// A URL nothing is listening on.
pub fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/stream", port)
}

fn handle(mut stream: TcpStream, port: u16) {
    let mut buf = [0u8; 4096];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    match path {
        "/stream" => serve_stream(stream),
        "/" => respond(
            &mut stream,
            "200 OK",
            "<html>\n<head><title>test</title></head>\n<body>\n<script src=\"/app-test.js\"></script>\n</body>\n</html>\n",
        ),
        "/app-test.js" => respond(
            &mut stream,
            "200 OK",
            &format!("var a=1,b={{https:!0,token:\"{}\",urlCount:5}},c=2", TOKEN),
        ),
        "/netflix/speedtest" => serve_targets(&mut stream, port, query),
        "/broken/netflix/speedtest" => respond(&mut stream, "500 Internal Server Error", ""),
        "/stall" | "/slow/netflix/speedtest" => {
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                BODY_LEN
            );
            let _ = stream.write_all(header.as_bytes());
            thread::sleep(Duration::from_secs(60));
        }
        "/small" => {
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                SMALL_LEN
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&vec![0x5Au8; SMALL_LEN]);
        }
        "/fail" => {
            let _ = stream.write_all(
                b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
        }
        _ => {
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
        }
    }
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let header = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(body.as_bytes());
}

fn serve_targets(stream: &mut TcpStream, port: u16, query: &str) {
    let param = |name: &str| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    };
    if param("token").as_deref() != Some(TOKEN) {
        respond(stream, "403 Forbidden", "");
        return;
    }
    let count: usize = param("urlCount")
        .and_then(|c| c.parse().ok())
        .unwrap_or(3)
        .min(5);
    let targets: Vec<String> = (0..count)
        .map(|i| format!("{{\"url\": \"http://127.0.0.1:{}/small?c={}\"}}", port, i))
        .collect();
    respond(stream, "200 OK", &format!("[{}]", targets.join(",")));
}

fn serve_stream(mut stream: TcpStream) {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        BODY_LEN
    );
    if stream.write_all(header.as_bytes()).is_err() {
        return;
    }
    let block = vec![0xA5u8; WRITE_SIZE];
    let mut sent = 0;
    while sent < BODY_LEN {
        if stream.write_all(&block).is_err() {
            return;
        }
        sent += WRITE_SIZE;
        thread::sleep(WRITE_PAUSE);
    }
}
