//! One live connection, from open to termination
//!
//! A session never retries. It consumes the connection until the operator
//! asks it to stop or the connection fails, then reports why it ended.

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::failure::SessionFailure;
use crate::filter::LanguageFilter;
use crate::record::{EventRecord, StreamMessage};
use crate::signal::StopSignal;
use crate::sink::EventSink;
use crate::stream::{EventSource, Inbound, Provider, StreamRequest};
use crate::terms::TrackedTerms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    /// Longest single wait on the connection; bounds stop-request latency
    pub poll_interval: Duration,
    pub disconnect_on_failure: bool,
    pub progress_every: u64,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_timeout: config.stream.idle_timeout(),
            poll_interval: Duration::from_millis(250),
            disconnect_on_failure: config.stream.disconnect_on_failure,
            progress_every: config.progress_every,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    /// Events that passed the filter and were written
    pub accepted: u64,
    /// Events dropped by the language filter
    pub filtered: u64,
    /// Lines skipped because they did not parse
    pub malformed: u64,
}

#[derive(Debug)]
pub enum SessionEnd {
    /// The operator asked to stop
    Stopped,
    Failed(SessionFailure),
}

#[derive(Debug)]
pub struct SessionReport {
    pub counts: SessionCounts,
    pub streamed_for: Duration,
    pub state: ConnectionState,
    pub end: SessionEnd,
}

pub struct Session<'a, S: EventSource, K: EventSink> {
    source: S,
    sink: &'a mut K,
    filter: &'a LanguageFilter,
    stop: &'a StopSignal,
    settings: &'a SessionSettings,
    state: ConnectionState,
    counts: SessionCounts,
    started: Instant,
}

impl<'a, S: EventSource, K: EventSink> Session<'a, S, K> {
    /// Open the filtered connection
    ///
    /// Tracked terms and languages are sent as subscription parameters; the
    /// language filter is applied again to every received event.
    pub fn open<P>(
        provider: &P,
        terms: &TrackedTerms,
        filter: &'a LanguageFilter,
        sink: &'a mut K,
        stop: &'a StopSignal,
        settings: &'a SessionSettings,
    ) -> Result<Self, SessionFailure>
    where
        P: Provider<Source = S>,
    {
        log::debug!("Session {} -> {}", ConnectionState::Disconnected, ConnectionState::Connecting);
        log::info!(
            "Connecting: {} tracked terms, languages: {}",
            terms.len(),
            filter.describe()
        );

        let request = StreamRequest {
            terms,
            languages: filter.languages(),
        };
        let source = provider.connect(&request).inspect_err(|failure| {
            log::error!("Provider error on connect: {}", failure);
            log::debug!("Session {} -> {}", ConnectionState::Connecting, ConnectionState::Failed);
        })?;

        log::debug!("Session {} -> {}", ConnectionState::Connecting, ConnectionState::Streaming);
        Ok(Self {
            source,
            sink,
            filter,
            stop,
            settings,
            state: ConnectionState::Streaming,
            counts: SessionCounts::default(),
            started: Instant::now(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consume the connection until it fails or a stop is requested
    pub fn run(mut self) -> SessionReport {
        let end = self.consume();
        self.source.close();

        let next = match &end {
            SessionEnd::Stopped => ConnectionState::Disconnected,
            SessionEnd::Failed(_) => ConnectionState::Failed,
        };
        log::debug!("Session {} -> {}", self.state, next);
        self.state = next;

        let streamed_for = self.started.elapsed();
        log::info!(
            "Session ended after {:.1}s: {} accepted, {} filtered, {} malformed",
            streamed_for.as_secs_f64(),
            self.counts.accepted,
            self.counts.filtered,
            self.counts.malformed
        );

        SessionReport {
            counts: self.counts,
            streamed_for,
            state: self.state,
            end,
        }
    }

    fn consume(&mut self) -> SessionEnd {
        let mut last_activity = Instant::now();

        loop {
            if self.stop.is_requested() {
                log::info!("Stop requested, closing connection");
                return SessionEnd::Stopped;
            }

            let idle = last_activity.elapsed();
            if idle >= self.settings.idle_timeout {
                return SessionEnd::Failed(SessionFailure::dropped(format!(
                    "no data for {}s",
                    idle.as_secs()
                )));
            }
            let wait = (self.settings.idle_timeout - idle).min(self.settings.poll_interval);

            match self.source.recv(wait) {
                Ok(None) => {}
                Ok(Some(Inbound::KeepAlive)) => {
                    last_activity = Instant::now();
                    log::trace!("keep-alive");
                }
                Ok(Some(Inbound::Malformed(reason))) => {
                    last_activity = Instant::now();
                    self.counts.malformed += 1;
                    log::warn!("Skipping undecodable line: {}", reason);
                }
                Ok(Some(Inbound::Line(line))) => {
                    last_activity = Instant::now();
                    if let Err(failure) = self.dispatch(&line) {
                        return SessionEnd::Failed(failure);
                    }
                }
                Err(failure) => {
                    log::warn!("Connection lost: {}", failure);
                    return SessionEnd::Failed(failure);
                }
            }
        }
    }

    fn dispatch(&mut self, line: &str) -> Result<(), SessionFailure> {
        let message = match StreamMessage::parse(line) {
            Ok(message) => message,
            Err(e) => {
                self.counts.malformed += 1;
                log::warn!("Skipping {}", e);
                return Ok(());
            }
        };

        match message {
            StreamMessage::Event(record) => self.on_event(record),
            StreamMessage::Limit { undelivered } => {
                log::info!("Provider withheld {} matching events so far", undelivered);
                Ok(())
            }
            StreamMessage::Warning { code, message } => {
                log::error!("Provider warning {}: {}", code, message);
                if self.settings.disconnect_on_failure {
                    log::error!("Disconnecting streamer ...");
                    return Err(SessionFailure::dropped(format!("provider warning {}: {}", code, message)));
                }
                Ok(())
            }
            StreamMessage::Disconnect { code, reason } => {
                log::error!("Provider disconnect, code {}: {}", code, reason);
                Err(SessionFailure::from_disconnect(code, reason))
            }
            StreamMessage::Notice { kind } => {
                log::debug!("Ignoring {} notice", kind);
                Ok(())
            }
        }
    }

    fn on_event(&mut self, record: EventRecord) -> Result<(), SessionFailure> {
        if !self.filter.accept(&record) {
            self.counts.filtered += 1;
            log::trace!("Filtered out (lang={:?})", record.lang());
            return Ok(());
        }

        log::debug!("Accepted {}", record.summary());
        self.sink.append(&record)?;
        self.counts.accepted += 1;

        if progress_due(self.counts.accepted, self.settings.progress_every) {
            log::info!("Accepted {} events", self.counts.accepted);
        }
        Ok(())
    }
}

/// Whether the `accepted`-th event earns a progress notice; `every == 0` disables them
fn progress_due(accepted: u64, every: u64) -> bool {
    every > 0 && accepted > 0 && accepted % every == 0
}
