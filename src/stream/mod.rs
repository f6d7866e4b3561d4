//! Live stream connections
//!
//! A [`Provider`] opens one filtered connection per session and hands back an
//! [`EventSource`], a blocking receive handle. Sessions only ever talk to these
//! two traits, so tests can substitute scripted connections.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::failure::SessionFailure;
use crate::terms::TrackedTerms;

pub mod http;
pub mod oauth;
#[cfg(test)]
pub mod scripted;
pub mod socket;

pub use http::HttpProvider;

/// One item read off a live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A non-blank payload line
    Line(String),
    /// Blank keep-alive line
    KeepAlive,
    /// A line that cannot be passed on unaltered
    Malformed(String),
}

/// Server-side subscription parameters
#[derive(Debug, Clone, Copy)]
pub struct StreamRequest<'a> {
    pub terms: &'a TrackedTerms,
    pub languages: Option<&'a BTreeSet<String>>,
}

impl StreamRequest<'_> {
    /// Form parameters for the subscription call
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("track".to_string(), self.terms.track_param())];
        if let Some(langs) = self.languages
            && !langs.is_empty()
        {
            let joined = langs.iter().cloned().collect::<Vec<_>>().join(",");
            params.push(("language".to_string(), joined));
        }
        params
    }
}

/// Blocking receive side of an open connection
pub trait EventSource {
    /// Wait up to `wait` for the next item
    ///
    /// `Ok(None)` means nothing arrived in time; the connection is still open.
    /// An `Err` means the connection is gone.
    fn recv(&mut self, wait: Duration) -> Result<Option<Inbound>, SessionFailure>;

    /// Tear the connection down; further `recv` calls fail
    fn close(&mut self);
}

/// Opens filtered connections
pub trait Provider {
    type Source: EventSource;

    fn connect(&self, request: &StreamRequest<'_>) -> Result<Self::Source, SessionFailure>;
}
