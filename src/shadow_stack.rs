//! Shadow stack of open calls
//!
//! Mirrors the traced program's call stack from call/return events alone.
//! Pops are validated against the top frame's identity; a return that does
//! not match the top is an orphan and leaves the stack untouched.
//!
//! Every call is pushed, including calls whose record was suppressed. A
//! suppressed entry still matches its return, but `visible_caller` looks
//! past it, so children of a hidden layer attribute to the nearest shown
//! ancestor instead of to ROOT or to the hidden frame.

use crate::frame::Frame;

/// Initial capacity; deep recursion grows the vector as needed
const INITIAL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
struct OpenFrame {
    frame: Frame,
    suppressed: bool,
}

/// Open frames in nesting order, innermost last
#[derive(Debug, Clone)]
pub struct ShadowStack {
    frames: Vec<OpenFrame>,
    /// Deepest nesting observed since creation
    max_depth: usize,
}

/// Outcome of offering a return event to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopOutcome {
    Popped,
    /// Stack top did not match; nothing changed
    Orphan,
}

impl ShadowStack {
    pub fn new() -> Self {
        Self {
            frames: Vec::with_capacity(INITIAL_CAPACITY),
            max_depth: 0,
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.push_entry(frame, false);
    }

    /// Push a frame whose own record was not emitted
    pub fn push_suppressed(&mut self, frame: Frame) {
        self.push_entry(frame, true);
    }

    fn push_entry(&mut self, frame: Frame, suppressed: bool) {
        self.frames.push(OpenFrame { frame, suppressed });
        self.max_depth = self.max_depth.max(self.frames.len());
    }

    /// Pop iff the top frame has the same identity as `frame`
    pub fn pop_matching(&mut self, frame: &Frame) -> PopOutcome {
        match self.frames.last() {
            Some(top) if top.frame.same_method(frame) => {
                self.frames.pop();
                PopOutcome::Popped
            }
            _ => PopOutcome::Orphan,
        }
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last().map(|open| &open.frame)
    }

    /// Innermost open frame, or the ROOT sentinel when nothing is open
    pub fn caller(&self) -> Frame {
        self.top().cloned().unwrap_or_else(Frame::root)
    }

    /// Innermost open frame that was not suppressed, or ROOT
    pub fn visible_caller(&self) -> Frame {
        self.frames
            .iter()
            .rev()
            .find(|open| !open.suppressed)
            .map(|open| open.frame.clone())
            .unwrap_or_else(Frame::root)
    }

    /// Drop every open frame (segment boundary)
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Open frames, outermost first
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().map(|open| &open.frame)
    }
}

impl Default for ShadowStack {
    fn default() -> Self {
        Self::new()
    }
}
