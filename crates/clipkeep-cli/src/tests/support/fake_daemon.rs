//! Fake server for behavioural tests.
//!
//! Accepts a single TCP connection, records the request line and streams
//! canned response lines so CLI tests never need a running `clipkeepd`.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use clipkeep_types::session::DaemonMessage;

pub(in crate::tests) struct FakeDaemon {
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    handle: Option<thread::JoinHandle<Result<(), String>>>,
}

impl FakeDaemon {
    /// Spawns a fake server on an ephemeral port that answers with `lines`.
    pub fn spawn(lines: Vec<String>) -> Result<Self, String> {
        let listener =
            TcpListener::bind(("127.0.0.1", 0)).map_err(|error| format!("bind: {error}"))?;
        listener
            .set_nonblocking(true)
            .map_err(|error| format!("nonblocking: {error}"))?;
        let port = listener
            .local_addr()
            .map_err(|error| format!("local addr: {error}"))?
            .port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let handle = thread::spawn(move || serve_client(&listener, &lines, &recorded));
        Ok(Self {
            port,
            requests,
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the server thread and returns the recorded request lines.
    pub fn take_requests(&mut self) -> Result<Vec<String>, String> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| "fake server thread panicked".to_owned())??;
        }
        let requests = self
            .requests
            .lock()
            .map_err(|error| format!("lock requests: {error}"))?;
        Ok(requests.clone())
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _outcome = handle.join();
        }
    }
}

fn serve_client(
    listener: &TcpListener,
    lines: &[String],
    requests: &Mutex<Vec<String>>,
) -> Result<(), String> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream
                    .set_nonblocking(false)
                    .map_err(|error| format!("blocking stream: {error}"))?;
                record_request(&stream, requests)?;
                return write_lines(stream, lines).map_err(|error| format!("write: {error}"));
            }
            Err(ref error)
                if error.kind() == io::ErrorKind::WouldBlock && Instant::now() < deadline =>
            {
                thread::sleep(Duration::from_millis(10));
            }
            // The CLI may finish without connecting at all.
            Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(error) => return Err(format!("accept: {error}")),
        }
    }
}

fn record_request(stream: &TcpStream, requests: &Mutex<Vec<String>>) -> Result<(), String> {
    let clone = stream
        .try_clone()
        .map_err(|error| format!("clone stream: {error}"))?;
    let mut line = String::new();
    let read = BufReader::new(clone)
        .read_line(&mut line)
        .map_err(|error| format!("read request: {error}"))?;
    if read > 0 {
        requests
            .lock()
            .map_err(|error| format!("lock requests: {error}"))?
            .push(line);
    }
    Ok(())
}

fn write_lines(mut stream: TcpStream, lines: &[String]) -> io::Result<()> {
    for line in lines {
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
    }
    stream.flush()
}

/// Serialises server messages into response lines.
pub(in crate::tests) fn message_lines(messages: &[DaemonMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|message| serde_json::to_string(message).expect("serialise server message"))
        .collect()
}
