//! Reconnection supervisor
//!
//! Runs sessions one after another against the same output until a failure
//! the retry policy will not reconnect after, or an operator stop. Reconnects
//! back off exponentially on consecutive failures; a session that streams for
//! long enough resets the count.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::failure::SessionFailure;
use crate::filter::LanguageFilter;
use crate::session::{Session, SessionCounts, SessionEnd, SessionSettings};
use crate::signal::StopSignal;
use crate::sink::EventSink;
use crate::stream::Provider;
use crate::terms::TrackedTerms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicy {
    /// Reconnect after every failure except output errors
    Always,
    /// Reconnect after recoverable failures, stop on terminal ones
    Recoverable,
    /// Stop after the first session, whatever its outcome
    Never,
}

#[derive(Debug)]
pub enum StopReason {
    OperatorStop,
    /// The policy forbids reconnecting
    RetryDisabled(SessionFailure),
    Terminal(SessionFailure),
    AttemptsExhausted { attempts: u32, last: SessionFailure },
}

impl StopReason {
    /// Whether the run ended because of a failure the operator must act on
    pub fn is_error(&self) -> bool {
        matches!(self, StopReason::Terminal(_) | StopReason::AttemptsExhausted { .. })
    }

    pub fn failure(&self) -> Option<&SessionFailure> {
        match self {
            StopReason::OperatorStop => None,
            StopReason::RetryDisabled(f) | StopReason::Terminal(f) => Some(f),
            StopReason::AttemptsExhausted { last, .. } => Some(last),
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::OperatorStop => write!(f, "stopped by operator"),
            StopReason::RetryDisabled(failure) => write!(f, "retry disabled, last failure: {}", failure),
            StopReason::Terminal(failure) => write!(f, "terminal failure: {}", failure),
            StopReason::AttemptsExhausted { attempts, last } => {
                write!(f, "gave up after {} consecutive failures, last: {}", attempts, last)
            }
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub sessions: u32,
    pub counts: SessionCounts,
    pub reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Retry,
    RetryDisabled,
    Terminal,
}

fn decide(policy: RetryPolicy, failure: &SessionFailure) -> Decision {
    if failure.is_fatal() || (policy != RetryPolicy::Always && !failure.is_recoverable()) {
        return Decision::Terminal;
    }
    match policy {
        RetryPolicy::Never => Decision::RetryDisabled,
        RetryPolicy::Always | RetryPolicy::Recoverable => Decision::Retry,
    }
}

/// Capped exponential backoff keyed on consecutive failures
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, failures: 0 }
    }

    pub fn reset(&mut self) {
        if self.failures > 0 {
            log::debug!("Resetting backoff after {} failures", self.failures);
        }
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Count a failure and return the delay before the next attempt
    pub fn record_failure(&mut self, failure: &SessionFailure) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.delay_for(failure)
    }

    pub fn exhausted(&self) -> bool {
        self.config.max_attempts.is_some_and(|max| self.failures >= max)
    }

    fn delay_for(&self, failure: &SessionFailure) -> Duration {
        let base = if failure.is_rate_limit() {
            self.config.rate_limit_delay()
        } else {
            self.config.initial_delay()
        };

        let exponent = self.failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max = self.config.max_delay().as_secs_f64();
        let mut secs = (base.as_secs_f64() * self.config.multiplier.max(1.0).powi(exponent)).min(max);

        if self.config.jitter {
            secs = (secs * rand::thread_rng().gen_range(0.5..1.5)).min(max);
        }

        // Caps near u64::MAX seconds do not survive the float round trip
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(self.config.max_delay())
    }
}

pub struct Supervisor<P: Provider, K: EventSink> {
    provider: P,
    sink: K,
    terms: TrackedTerms,
    filter: LanguageFilter,
    settings: SessionSettings,
    retry: RetryConfig,
    stop: StopSignal,
}

impl<P: Provider, K: EventSink> Supervisor<P, K> {
    pub fn new(
        provider: P,
        sink: K,
        terms: TrackedTerms,
        filter: LanguageFilter,
        settings: SessionSettings,
        retry: RetryConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            provider,
            sink,
            terms,
            filter,
            settings,
            retry,
            stop,
        }
    }

    /// Run sessions until the retry policy or the operator ends the run
    pub fn run(&mut self) -> RunReport {
        let mut backoff = Backoff::new(self.retry.clone());
        let mut sessions = 0u32;
        let mut counts = SessionCounts::default();

        log::info!("Supervisor running with retry policy {:?}", self.retry.policy);

        let reason = loop {
            if self.stop.is_requested() {
                break StopReason::OperatorStop;
            }

            sessions += 1;
            log::info!("Opening session #{}", sessions);

            let opened = Session::open(
                &self.provider,
                &self.terms,
                &self.filter,
                &mut self.sink,
                &self.stop,
                &self.settings,
            );
            let end = match opened {
                Ok(session) => {
                    log::debug!("Session #{} is {}", sessions, session.state());
                    let report = session.run();
                    log::debug!("Session #{} ended {}", sessions, report.state);
                    counts.accepted += report.counts.accepted;
                    counts.filtered += report.counts.filtered;
                    counts.malformed += report.counts.malformed;
                    if report.streamed_for >= self.retry.min_healthy() {
                        backoff.reset();
                    }
                    report.end
                }
                Err(failure) => SessionEnd::Failed(failure),
            };

            let failure = match end {
                SessionEnd::Stopped => break StopReason::OperatorStop,
                SessionEnd::Failed(failure) => failure,
            };

            match decide(self.retry.policy, &failure) {
                Decision::Terminal => break StopReason::Terminal(failure),
                Decision::RetryDisabled => break StopReason::RetryDisabled(failure),
                Decision::Retry => {}
            }

            let delay = backoff.record_failure(&failure);
            if backoff.exhausted() {
                break StopReason::AttemptsExhausted {
                    attempts: backoff.failures(),
                    last: failure,
                };
            }

            log::warn!(
                "Session #{} failed ({}); reconnecting in {:.1}s (consecutive failures: {})",
                sessions,
                failure,
                delay.as_secs_f64(),
                backoff.failures()
            );
            if self.stop.sleep(delay) {
                break StopReason::OperatorStop;
            }
        };

        if reason.is_error() {
            log::error!("Run stopped: {}", reason);
        } else {
            log::info!("Run stopped: {}", reason);
        }

        RunReport {
            sessions,
            counts,
            reason,
        }
    }

    pub fn into_sink(self) -> K {
        self.sink
    }
}
