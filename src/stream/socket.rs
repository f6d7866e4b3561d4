//! Plain TCP transport for the HTTP agent that keeps an abort handle
//!
//! A stalled stream leaves the reader thread parked in `read` with no data
//! and no error. The connector keeps a clone of every socket it opens so the
//! session can shut the connection down from outside, which wakes the reader
//! and releases the response body.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};

use ureq::unversioned::transport::{Buffers, ConnectionDetails, Connector, LazyBuffers, NextTimeout, Transport};

/// Clone of the most recently opened socket
#[derive(Debug, Clone, Default)]
pub struct SocketSlot {
    last: Arc<Mutex<Option<TcpStream>>>,
}

impl SocketSlot {
    fn register(&self, stream: &TcpStream) {
        match stream.try_clone() {
            Ok(clone) => {
                if let Ok(mut slot) = self.last.lock() {
                    *slot = Some(clone);
                }
            }
            Err(e) => log::warn!("Cannot keep an abort handle for the stream socket: {}", e),
        }
    }

    /// Take the handle for the connection opened last
    pub fn take(&self) -> Option<SocketAbort> {
        self.last.lock().ok().and_then(|mut slot| slot.take()).map(SocketAbort)
    }
}

/// Shuts a socket down, unblocking any thread reading from it
#[derive(Debug)]
pub struct SocketAbort(TcpStream);

impl SocketAbort {
    pub fn abort(self) {
        if let Err(e) = self.0.shutdown(Shutdown::Both) {
            log::debug!("Socket shutdown: {}", e);
        }
    }
}

/// Opens direct TCP connections and records each one in a [`SocketSlot`]
#[derive(Debug)]
pub struct AbortableTcpConnector {
    sockets: SocketSlot,
}

impl AbortableTcpConnector {
    pub fn new(sockets: SocketSlot) -> Self {
        Self { sockets }
    }
}

impl Connector<()> for AbortableTcpConnector {
    type Out = SocketTransport;

    fn connect(&self, details: &ConnectionDetails, _chained: Option<()>) -> Result<Option<Self::Out>, ureq::Error> {
        let stream = open(details)?;
        stream.set_nodelay(details.config.no_delay())?;
        self.sockets.register(&stream);

        let buffers = LazyBuffers::new(details.config.input_buffer_size(), details.config.output_buffer_size());
        Ok(Some(SocketTransport { stream, buffers }))
    }
}

fn open(details: &ConnectionDetails) -> Result<TcpStream, ureq::Error> {
    let timeout = details.timeout.not_zero().map(|t| *t);
    let mut last_err = None;

    for addr in details.addrs.iter() {
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(addr, t),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(ureq::Error::Timeout(details.timeout.reason)),
            Err(e) => {
                log::debug!("Connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address to connect to"))
        .into())
}

#[derive(Debug)]
pub struct SocketTransport {
    stream: TcpStream,
    buffers: LazyBuffers,
}

impl Transport for SocketTransport {
    fn buffers(&mut self) -> &mut dyn Buffers {
        &mut self.buffers
    }

    fn transmit_output(&mut self, amount: usize, timeout: NextTimeout) -> Result<(), ureq::Error> {
        self.stream.set_write_timeout(timeout.not_zero().map(|t| *t))?;
        let output = &self.buffers.output()[..amount];
        self.stream.write_all(output).map_err(|e| io_error(e, timeout))
    }

    fn await_input(&mut self, timeout: NextTimeout) -> Result<bool, ureq::Error> {
        self.stream.set_read_timeout(timeout.not_zero().map(|t| *t))?;
        let input = self.buffers.input_append_buf();
        let amount = self.stream.read(input).map_err(|e| io_error(e, timeout))?;
        self.buffers.input_appended(amount);
        Ok(amount > 0)
    }

    // Every subscription gets a fresh socket; nothing is pooled
    fn is_open(&mut self) -> bool {
        false
    }
}

fn io_error(e: io::Error, timeout: NextTimeout) -> ureq::Error {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ureq::Error::Timeout(timeout.reason),
        _ => e.into(),
    }
}
