//! Filtered stream over a long-lived HTTP response
//!
//! The subscription is a signed form POST; the response body is an endless
//! sequence of `\r\n`-delimited JSON objects interleaved with blank
//! keep-alive lines. A reader thread pumps lines into a bounded channel so the
//! session can wait on it with a timeout. Closing the source shuts the socket
//! down so a reader blocked on a stalled connection exits with it.

use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

use ureq::unversioned::resolver::DefaultResolver;
use ureq::unversioned::transport::{Connector, RustlsConnector};

use crate::config::StreamConfig;
use crate::credentials::Credentials;
use crate::failure::SessionFailure;
use crate::stream::oauth::{OAuthSigner, form_body};
use crate::stream::socket::{AbortableTcpConnector, SocketSlot};
use crate::stream::{EventSource, Inbound, Provider, StreamRequest};

const CHANNEL_CAPACITY: usize = 256;

type Pumped = Result<Inbound, String>;

/// Tears down the transport under a response body
pub type Abort = Box<dyn FnOnce() + Send>;

pub struct HttpProvider {
    agent: ureq::Agent,
    sockets: SocketSlot,
    endpoint: String,
    signer: OAuthSigner,
}

impl HttpProvider {
    pub fn new(credentials: Credentials, config: &StreamConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_connect(Some(config.connect_timeout()))
            .timeout_recv_response(Some(config.connect_timeout()))
            .http_status_as_error(false)
            .max_idle_connections(0)
            .proxy(None)
            .build();

        let sockets = SocketSlot::default();
        let connector = ()
            .chain(AbortableTcpConnector::new(sockets.clone()))
            .chain(RustlsConnector::default());
        let agent = ureq::Agent::with_parts(agent_config, connector, DefaultResolver::default());

        Self {
            agent,
            sockets,
            endpoint: config.endpoint.clone(),
            signer: OAuthSigner::new(credentials),
        }
    }
}

impl Provider for HttpProvider {
    type Source = HttpEventSource;

    fn connect(&self, request: &StreamRequest<'_>) -> Result<Self::Source, SessionFailure> {
        let params = request.params();
        let authorization = self.signer.authorization("POST", &self.endpoint, &params)?;
        let body = form_body(&params);

        log::debug!("POST {} ({})", self.endpoint, body);

        let sent = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", &authorization)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send(body.as_bytes());
        // Taken on every path so no stale handle outlives its connection
        let socket = self.sockets.take();

        let mut response =
            sent.map_err(|e| SessionFailure::dropped(format!("connect to {} failed: {}", self.endpoint, e)))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let message = response.body_mut().read_to_string().unwrap_or_default();
            return Err(SessionFailure::from_status(status, message.trim().to_string()));
        }

        if socket.is_none() {
            log::warn!("No abort handle for the stream socket; a stalled connection may linger after close");
        }
        let abort = socket.map(|s| Box::new(move || s.abort()) as Abort);

        log::info!("Connected to {} (status {})", self.endpoint, status);
        Ok(HttpEventSource::spawn(response.into_body().into_reader(), abort))
    }
}

pub struct HttpEventSource {
    rx: Option<Receiver<Pumped>>,
    abort: Option<Abort>,
}

impl HttpEventSource {
    fn spawn<R: Read + Send + 'static>(reader: R, abort: Option<Abort>) -> Self {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        let rx = thread::Builder::new()
            .name("stream-reader".to_string())
            .spawn(move || pump(reader, tx))
            .map(|_| rx)
            .inspect_err(|e| log::error!("Failed to start stream reader thread: {}", e))
            .ok();
        Self { rx, abort }
    }
}

impl EventSource for HttpEventSource {
    fn recv(&mut self, wait: Duration) -> Result<Option<Inbound>, SessionFailure> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| SessionFailure::dropped("connection closed"))?;

        match rx.recv_timeout(wait) {
            Ok(Ok(item)) => Ok(Some(item)),
            Ok(Err(reason)) => Err(SessionFailure::dropped(reason)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SessionFailure::dropped("stream reader exited")),
        }
    }

    fn close(&mut self) {
        self.rx = None;
        // Wakes a reader blocked in `read`; it then drops the response body
        if let Some(abort) = self.abort.take() {
            abort();
            log::debug!("Closed stream connection");
        }
    }
}

impl Drop for HttpEventSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read lines until the body ends, fails, or the receiver goes away
fn pump<R: Read>(reader: R, tx: SyncSender<Pumped>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(8192);

    loop {
        buf.clear();
        let item = match reader.read_until(b'\n', &mut buf) {
            Ok(0) => Err("stream closed by provider".to_string()),
            Ok(_) => Ok(classify(&buf)),
            Err(e) => Err(format!("read failed: {}", e)),
        };

        let finished = item.is_err();
        if tx.send(item).is_err() || finished {
            return;
        }
    }
}

/// Lines are passed on byte for byte; anything that is not UTF-8 is flagged, never repaired
fn classify(raw: &[u8]) -> Inbound {
    match std::str::from_utf8(raw) {
        Ok(line) => {
            let line = line.trim();
            if line.is_empty() {
                Inbound::KeepAlive
            } else {
                Inbound::Line(line.to_string())
            }
        }
        Err(e) => Inbound::Malformed(format!("invalid UTF-8 after {} bytes", e.valid_up_to())),
    }
}
