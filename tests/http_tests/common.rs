//! Shared helpers: a live HTTP server on an ephemeral port and a raw client

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hurmadb::{Config, Engine, HttpServer, TerminationLatch};
use tempfile::TempDir;

pub struct TestServer {
    pub addr: SocketAddr,
    pub latch: TerminationLatch,
    pub engine: Arc<Engine>,
    handle: Option<JoinHandle<hurmadb::Result<()>>>,
    _dir: TempDir,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with(|builder| builder)
    }

    pub fn start_with(
        tweak: impl FnOnce(hurmadb::config::ConfigBuilder) -> hurmadb::config::ConfigBuilder,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let config = tweak(
            Config::builder()
                .data_dir(dir.path())
                .listen_addr("127.0.0.1:0")
                .accept_poll_interval_ms(10),
        )
        .build();

        let engine = Arc::new(Engine::open(config.clone()).unwrap());
        let latch = TerminationLatch::new();
        let server = HttpServer::bind(config, Arc::clone(&engine), latch.clone()).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = thread::spawn(move || server.run());

        Self {
            addr,
            latch,
            engine,
            handle: Some(handle),
            _dir: dir,
        }
    }

    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    /// One request on a fresh connection that the server closes afterwards
    pub fn request(&self, method: &str, path: &str, body: &[u8]) -> (u16, Vec<u8>) {
        let stream = self.connect();
        send(&stream, method, path, body, false);
        let response = read_response(&mut BufReader::new(&stream));
        (response.status, response.body)
    }

    /// Wait for `run` to return; panics if it does not within `timeout`
    pub fn join(&mut self, timeout: Duration) -> hurmadb::Result<()> {
        let handle = self.handle.take().unwrap();
        let deadline = std::time::Instant::now() + timeout;
        while !handle.is_finished() {
            assert!(std::time::Instant::now() < deadline, "server did not stop");
            thread::sleep(Duration::from_millis(10));
        }
        handle.join().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.latch.terminate();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub fn send(mut stream: &TcpStream, method: &str, path: &str, body: &[u8], keep_alive: bool) {
    let connection = if keep_alive { "keep-alive" } else { "close" };
    write!(
        stream,
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n",
        method,
        path,
        body.len(),
        connection
    )
    .unwrap();
    stream.write_all(body).unwrap();
    stream.flush().unwrap();
}

/// Parse one response framed by Content-Length
pub fn read_response(reader: &mut impl BufRead) -> RawResponse {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let status: u16 = line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("bad status line {:?}", line));

    let mut headers = Vec::new();
    loop {
        line.clear();
        reader.read_line(&mut line).unwrap();
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        let (name, value) = trimmed.split_once(':').unwrap();
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let len: usize = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.parse().unwrap())
        .unwrap_or(0);
    let mut body = vec![0; len];
    reader.read_exact(&mut body).unwrap();

    RawResponse {
        status,
        headers,
        body,
    }
}
