//! Shared helpers for integration tests: in-memory clients and a fake TCP
//! store that speaks enough RESP to answer the adapter.

#![allow(dead_code)]

use redts::Result;
use redts::pool::StoreClient;
use redts::resp::{Command, read_array_len, read_string};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Records every pipelined batch and answers queries with a canned reply.
#[derive(Default)]
pub struct RecordingClient {
    pub batches: Mutex<Vec<Vec<Command>>>,
    pub queries: Mutex<Vec<Command>>,
    pub reply: Vec<u8>,
}

impl RecordingClient {
    pub fn with_reply(reply: &[u8]) -> Self {
        Self {
            reply: reply.to_vec(),
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<Command>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

impl StoreClient for RecordingClient {
    fn pipeline(&self, commands: &[Command]) -> Result<()> {
        self.batches.lock().unwrap().push(commands.to_vec());
        Ok(())
    }

    fn query(
        &self,
        command: &Command,
        decode: &mut dyn FnMut(&mut dyn BufRead) -> Result<()>,
    ) -> Result<()> {
        self.queries.lock().unwrap().push(command.clone());
        decode(&mut self.reply.as_slice())
    }
}

/// Produces the raw reply for one received command.
pub type Handler = dyn Fn(&[String]) -> Vec<u8> + Send + Sync;

/// A fake store listening on an ephemeral localhost port.
///
/// Each accepted connection is served on its own thread. Threads are
/// detached and die with the test process.
pub struct FakeServer {
    pub addr: String,
    received: Arc<Mutex<Vec<Vec<String>>>>,
    live: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
}

impl FakeServer {
    /// Starts a server answering every command with `handler`.
    pub fn start(handler: impl Fn(&[String]) -> Vec<u8> + Send + Sync + 'static) -> Self {
        Self::start_with_limit(usize::MAX, handler)
    }

    /// Starts a server that closes each connection after answering
    /// `per_connection` commands.
    pub fn start_with_limit(
        per_connection: usize,
        handler: impl Fn(&[String]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handler: Arc<Handler> = Arc::new(handler);
        let received = Arc::new(Mutex::new(Vec::new()));
        let live = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));

        {
            let received = Arc::clone(&received);
            let live = Arc::clone(&live);
            let accepted = Arc::clone(&accepted);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { continue };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    live.fetch_add(1, Ordering::SeqCst);
                    let handler = Arc::clone(&handler);
                    let received = Arc::clone(&received);
                    let live = Arc::clone(&live);
                    thread::spawn(move || {
                        serve(stream, per_connection, handler.as_ref(), &received);
                        live.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });
        }

        Self {
            addr,
            received,
            live,
            accepted,
        }
    }

    /// Every command received so far, as `[name, args...]`.
    pub fn received(&self) -> Vec<Vec<String>> {
        self.received.lock().unwrap().clone()
    }

    /// Received commands whose name is `name`.
    pub fn received_named(&self, name: &str) -> Vec<Vec<String>> {
        self.received()
            .into_iter()
            .filter(|cmd| cmd[0] == name)
            .collect()
    }

    /// Connections currently open.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Connections accepted since start.
    pub fn accepted_connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Host and port as separate strings.
    pub fn host_port(&self) -> (String, String) {
        let (host, port) = self.addr.rsplit_once(':').unwrap();
        (host.to_string(), port.to_string())
    }
}

fn serve(
    stream: TcpStream,
    per_connection: usize,
    handler: &Handler,
    received: &Mutex<Vec<Vec<String>>>,
) {
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    for _ in 0..per_connection {
        let Ok(len) = read_array_len(&mut reader) else {
            return;
        };
        let mut parts = Vec::with_capacity(len);
        for _ in 0..len {
            let Ok(part) = read_string(&mut reader) else {
                return;
            };
            parts.push(part);
        }
        received.lock().unwrap().push(parts.clone());
        if writer.write_all(&handler(&parts)).is_err() {
            return;
        }
    }
}

/// Polls `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Encodes a RESP bulk string.
pub fn bulk(s: &str) -> Vec<u8> {
    format!("${}\r\n{s}\r\n", s.len()).into_bytes()
}

/// Encodes one `[key, labels, samples]` element of a `TS.MRANGE` reply.
pub fn series_reply(key: &str, labels: &[(&str, &str)], samples: &[(i64, &str)]) -> Vec<u8> {
    let mut out = b"*3\r\n".to_vec();
    out.extend(bulk(key));
    out.extend(format!("*{}\r\n", labels.len()).into_bytes());
    for (name, value) in labels {
        out.extend_from_slice(b"*2\r\n");
        out.extend(bulk(name));
        out.extend(bulk(value));
    }
    out.extend(format!("*{}\r\n", samples.len()).into_bytes());
    for (ts, value) in samples {
        out.extend(format!("*2\r\n:{ts}\r\n").into_bytes());
        out.extend(bulk(value));
    }
    out
}

/// Encodes a `TS.MRANGE` reply from elements built by [`series_reply`].
pub fn mrange_reply(series: &[Vec<u8>]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", series.len()).into_bytes();
    for element in series {
        out.extend_from_slice(element);
    }
    out
}
