use std::fmt;

use super::intent::Intent;
use crate::error::SessionError;

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Idle,
    Initializing,
    Ready,
    Capturing,
    Listening,
    Processing,
    Speaking,
    Error,
}

impl Status {
    /// States in which one-shot intents are rejected.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Status::Capturing | Status::Listening | Status::Processing | Status::Speaking
        )
    }
}

/// Identifies one pipeline run. Assigned in increasing order per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out request ids; never reuses one.
#[derive(Debug, Default)]
pub(crate) struct RequestCounter {
    last: u64,
}

impl RequestCounter {
    pub(crate) fn next(&mut self) -> RequestId {
        self.last += 1;
        RequestId(self.last)
    }
}

/// What a display layer sees after each transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status: Status,
    pub message: String,
    /// Control that owns the current run, if any.
    pub intent: Option<Intent>,
}

/// The single mutable session. Only `SessionController` writes to it.
#[derive(Debug)]
pub struct Session {
    status: Status,
    message: String,
    active_request: Option<RequestId>,
    active_intent: Option<Intent>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            status: Status::Initializing,
            message: String::new(),
            active_request: None,
            active_intent: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn active_request(&self) -> Option<RequestId> {
        self.active_request
    }

    pub fn active_intent(&self) -> Option<Intent> {
        self.active_intent
    }

    pub fn is_busy(&self) -> bool {
        self.status.is_busy()
    }

    /// True if `request` belongs to the run currently in flight.
    pub fn is_current(&self, request: RequestId) -> bool {
        self.active_request == Some(request)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            message: self.message.clone(),
            intent: self.active_intent,
        }
    }

    /// Replace every field at once so no half-updated state is observable.
    pub(crate) fn set(
        &mut self,
        status: Status,
        message: String,
        request: Option<RequestId>,
        intent: Option<Intent>,
    ) {
        self.status = status;
        self.message = message;
        self.active_request = request;
        self.active_intent = intent;
    }
}

/// Inputs to the session state machine.
#[derive(Debug)]
pub enum SessionEvent {
    Trigger(Intent),
    Cancel,
    CameraReady,
    CameraFailed(SessionError),
    ListenFinished {
        request: RequestId,
        transcript: Option<String>,
    },
    InferenceFinished {
        request: RequestId,
        result: Result<String, SessionError>,
    },
    SpeechFinished {
        request: RequestId,
    },
    RecoveryElapsed {
        request: RequestId,
    },
    Shutdown,
}

/// Published to observers, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Changed(Snapshot),
    /// Immediate message that does not change the session.
    Alert(String),
}
