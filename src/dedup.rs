//! Unique-row memo
//!
//! With `unique` output enabled, each distinct encoded row is written once
//! per recorder session or flatten output. Rows are remembered verbatim so
//! distinct rows never collide.

use fnv::FnvHashSet;

#[derive(Debug, Default)]
pub struct RowMemo {
    seen: FnvHashSet<String>,
}

impl RowMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time `row` is offered
    pub fn first_sighting(&mut self, row: &str) -> bool {
        if self.seen.contains(row) {
            return false;
        }
        self.seen.insert(row.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
