//! Events delivered by the instrumentation source

use crate::frame::Frame;

/// Value of the `event` column that marks a segment boundary
pub const MARK_SENTINEL: &str = "---";

/// One observed event, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A method was entered. `caller` is present when the source already
    /// resolved the call site.
    Call { frame: Frame, caller: Option<Frame> },
    /// A method returned. Only the identity fields of `frame` matter.
    Return { frame: Frame },
    /// Segment boundary carrying free text
    Mark { label: String },
}

impl Event {
    pub fn call(frame: Frame) -> Self {
        Event::Call {
            frame,
            caller: None,
        }
    }

    pub fn call_from(frame: Frame, caller: Frame) -> Self {
        Event::Call {
            frame,
            caller: Some(caller),
        }
    }

    pub fn ret(frame: Frame) -> Self {
        Event::Return { frame }
    }

    pub fn mark(label: impl Into<String>) -> Self {
        Event::Mark {
            label: label.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Call { .. } => EventKind::Call,
            Event::Return { .. } => EventKind::Return,
            Event::Mark { .. } => EventKind::Mark,
        }
    }
}

/// Event discriminant as written in the `event` column of a raw log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Call,
    Return,
    Mark,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Call => "call",
            EventKind::Return => "return",
            EventKind::Mark => MARK_SENTINEL,
        }
    }

    /// Parse an `event` column value. Native-method variants
    /// (`c_call`, `c_return`) fold into their plain counterparts.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "call" | "c_call" => Some(EventKind::Call),
            "return" | "c_return" => Some(EventKind::Return),
            MARK_SENTINEL => Some(EventKind::Mark),
            _ => None,
        }
    }
}
