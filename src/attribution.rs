//! Caller attribution over a shadow stack
//!
//! Shared by the streaming recorder (tracked mode) and the flatten pass.
//! Filtering decides emission only; every call is pushed so returns keep
//! matching.
//!
//! Under the callee policy a call is attributed to the nearest open frame
//! that was itself emitted: hiding a middle layer re-parents its children
//! to their grandparent. Under the caller policy the filter looks at the
//! innermost open frame, and that frame is the attributed caller.

use crate::filter::{ExclusionPolicy, PathFilter};
use crate::frame::Frame;
use crate::record::Record;
use crate::shadow_stack::{PopOutcome, ShadowStack};

#[derive(Debug, Clone)]
pub struct Attributor {
    stack: ShadowStack,
    filter: PathFilter,
    policy: ExclusionPolicy,
    orphans: u64,
}

impl Attributor {
    pub fn new(filter: PathFilter, policy: ExclusionPolicy) -> Self {
        Self {
            stack: ShadowStack::new(),
            filter,
            policy,
            orphans: 0,
        }
    }

    /// Whether a call of `callee` from `caller` is withheld from output
    pub fn suppresses(&self, callee: &Frame, caller: &Frame) -> bool {
        self.filter.suppresses(self.policy.subject(callee, caller))
    }

    /// Push `frame` and return its record unless it is suppressed
    pub fn on_call(&mut self, frame: Frame) -> Option<Record> {
        let caller = match self.policy {
            ExclusionPolicy::Callee => self.stack.visible_caller(),
            ExclusionPolicy::Caller => self.stack.caller(),
        };

        if self.suppresses(&frame, &caller) {
            self.stack.push_suppressed(frame);
            return None;
        }

        self.stack.push(frame.clone());
        Some(Record::new(frame, caller))
    }

    pub fn on_return(&mut self, frame: &Frame) -> PopOutcome {
        let outcome = self.stack.pop_matching(frame);
        if outcome == PopOutcome::Orphan {
            self.orphans += 1;
            tracing::trace!(frame = %frame, depth = self.stack.depth(), "orphan return");
        }
        outcome
    }

    /// Segment boundary: forget every open frame
    pub fn reset(&mut self) {
        self.stack.reset();
    }

    pub fn stack(&self) -> &ShadowStack {
        &self.stack
    }

    pub fn policy(&self) -> ExclusionPolicy {
        self.policy
    }

    /// Orphan returns seen so far
    pub fn orphans(&self) -> u64 {
        self.orphans
    }
}
