//! Progress reporting between an install running on a worker thread and the caller.
//!
//! The worker pushes [ProgressEvent]s onto a [ProgressQueue]; the caller polls them off in the
//! order they were pushed. A poll that finds nothing within the timeout synthesizes an event
//! instead of blocking forever: [ProgressKind::Running] while the worker is alive,
//! [ProgressKind::Exit] once it is gone.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// How long [ProgressQueue::poll] waits for an event by default.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressKind {
    /// A phase began. The message names it.
    Start,
    /// Informational message inside the current phase.
    Detail,
    /// Percentage of scripts run so far.
    Progress,
    /// Nothing happened within the poll timeout, but the install is still going.
    Running,
    /// The current phase ended.
    Complete,
    /// The install is over. No further events follow.
    Exit,
}

impl fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgressKind::Start => "Start",
            ProgressKind::Detail => "Detail",
            ProgressKind::Progress => "Progress",
            ProgressKind::Running => "Running",
            ProgressKind::Complete => "Complete",
            ProgressKind::Exit => "Exit",
        };
        f.write_str(name)
    }
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub message: String,
    /// Percent complete for [ProgressKind::Progress]; the error count for [ProgressKind::Exit].
    pub percent: usize,
}

impl ProgressEvent {
    pub fn new(kind: ProgressKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            percent: 0,
        }
    }

    pub fn progress(percent: usize) -> Self {
        Self {
            kind: ProgressKind::Progress,
            message: String::new(),
            percent,
        }
    }

    pub fn exit(errors: usize, message: impl Into<String>) -> Self {
        Self {
            kind: ProgressKind::Exit,
            message: message.into(),
            percent: errors,
        }
    }

    /// The number of errors an [ProgressKind::Exit] event reports.
    pub fn errors(&self) -> Option<usize> {
        (self.kind == ProgressKind::Exit).then_some(self.percent)
    }
}

/// A FIFO of [ProgressEvent]s shared by one producer and one consumer.
#[derive(Debug)]
pub struct ProgressQueue {
    events: Mutex<VecDeque<ProgressEvent>>,
    ready: Condvar,
    timeout: Duration,
}

impl Default for ProgressQueue {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_POLL_TIMEOUT)
    }
}

impl ProgressQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            timeout,
        }
    }

    /// Append an event and wake a waiting poll.
    pub fn push(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
        self.ready.notify_one();
    }

    /// Take the oldest event, waiting up to the timeout for one to arrive.
    ///
    /// When none arrives, returns [ProgressKind::Running] if `worker_alive`, otherwise an
    /// [ProgressKind::Exit] with a zero error count.
    pub fn poll(&self, worker_alive: bool) -> ProgressEvent {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut events, _) = self
            .ready
            .wait_timeout_while(events, self.timeout, |events| events.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        match events.pop_front() {
            Some(event) => event,
            None if worker_alive => ProgressEvent::new(ProgressKind::Running, ""),
            None => ProgressEvent::exit(0, ""),
        }
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
