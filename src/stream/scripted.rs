//! Scripted connections for exercising sessions without a network

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use crate::failure::SessionFailure;
use crate::signal::StopSignal;
use crate::stream::{EventSource, Inbound, Provider, StreamRequest};

pub enum Step {
    Line(String),
    KeepAlive,
    /// A line the transport could not decode
    Garbled,
    /// Nothing arrives within the wait
    Quiet,
    Fail(SessionFailure),
    /// Simulate Ctrl-C while waiting on the connection
    RequestStop(StopSignal),
    /// Never deliver anything again
    Stall,
}

impl Step {
    pub fn line(s: &str) -> Self {
        Step::Line(s.to_string())
    }
}

type Steps = Rc<RefCell<VecDeque<Step>>>;

pub struct ScriptedSource {
    steps: Steps,
    closed: Rc<Cell<u32>>,
    is_closed: bool,
}

impl EventSource for ScriptedSource {
    fn recv(&mut self, wait: Duration) -> Result<Option<Inbound>, SessionFailure> {
        if self.is_closed {
            return Err(SessionFailure::dropped("connection closed"));
        }

        if matches!(self.steps.borrow().front(), Some(Step::Stall)) {
            thread::sleep(wait);
            return Ok(None);
        }

        match self.steps.borrow_mut().pop_front() {
            None => Err(SessionFailure::dropped("end of script")),
            Some(Step::Line(line)) => Ok(Some(Inbound::Line(line))),
            Some(Step::KeepAlive) => Ok(Some(Inbound::KeepAlive)),
            Some(Step::Garbled) => Ok(Some(Inbound::Malformed("invalid UTF-8 after 3 bytes".to_string()))),
            Some(Step::Quiet) | Some(Step::Stall) => Ok(None),
            Some(Step::Fail(failure)) => Err(failure),
            Some(Step::RequestStop(stop)) => {
                stop.request();
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.set(self.closed.get() + 1);
        }
    }
}

/// Hands out one scripted connection (or connect failure) per `connect` call
pub struct ScriptedProvider {
    scripts: RefCell<VecDeque<Result<Vec<Step>, SessionFailure>>>,
    current: RefCell<Option<Steps>>,
    closed: Rc<Cell<u32>>,
    requests: RefCell<Vec<Vec<(String, String)>>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Result<Vec<Step>, SessionFailure>>) -> Self {
        Self {
            scripts: RefCell::new(scripts.into()),
            current: RefCell::new(None),
            closed: Rc::new(Cell::new(0)),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Number of `connect` calls so far
    pub fn connects(&self) -> usize {
        self.requests.borrow().len()
    }

    /// Unread steps of the most recent connection
    pub fn remaining_steps(&self) -> usize {
        self.current.borrow().as_ref().map_or(0, |steps| steps.borrow().len())
    }

    pub fn closed_sources(&self) -> u32 {
        self.closed.get()
    }

    pub fn requests(&self) -> Vec<Vec<(String, String)>> {
        self.requests.borrow().clone()
    }
}

impl Provider for ScriptedProvider {
    type Source = ScriptedSource;

    fn connect(&self, request: &StreamRequest<'_>) -> Result<Self::Source, SessionFailure> {
        self.requests.borrow_mut().push(request.params());

        match self.scripts.borrow_mut().pop_front() {
            None => Err(SessionFailure::dropped("no more scripted connections")),
            Some(Err(failure)) => Err(failure),
            Some(Ok(steps)) => {
                let steps: Steps = Rc::new(RefCell::new(steps.into()));
                *self.current.borrow_mut() = Some(steps.clone());
                Ok(ScriptedSource {
                    steps,
                    closed: self.closed.clone(),
                    is_closed: false,
                })
            }
        }
    }
}
