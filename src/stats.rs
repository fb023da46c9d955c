//! Raw log statistics for the `stats` subcommand
//!
//! Replays a raw log through an unfiltered shadow stack and reports how well
//! calls and returns pair up, plus per-method call counts.

use crate::error::Result;
use crate::event::Event;
use crate::raw_log::RawLogReader;
use crate::shadow_stack::{PopOutcome, ShadowStack};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::Path;

/// Counters for a single method identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodStats {
    pub calls: u64,
    /// Returns of this method that did not match the stack top
    pub orphan_returns: u64,
}

/// Totals over a whole raw log
#[derive(Debug, Default)]
pub struct LogStats {
    methods: HashMap<String, MethodStats>,
    stack: ShadowStack,
    pub calls: u64,
    pub returns: u64,
    pub marks: u64,
    pub orphan_returns: u64,
    /// Frames left open when a mark reset the stack
    pub abandoned: u64,
}

impl LogStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut stats = Self::new();
        for event in RawLogReader::new(reader)? {
            stats.observe(&event?);
        }
        Ok(stats)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_reader(crate::raw_log::open_input(path)?)
    }

    pub fn observe(&mut self, event: &Event) {
        match event {
            Event::Call { frame, .. } => {
                self.calls += 1;
                self.methods.entry(frame.to_string()).or_default().calls += 1;
                self.stack.push(frame.clone());
            }
            Event::Return { frame } => {
                self.returns += 1;
                if self.stack.pop_matching(frame) == PopOutcome::Orphan {
                    self.orphan_returns += 1;
                    self.methods.entry(frame.to_string()).or_default().orphan_returns += 1;
                }
            }
            Event::Mark { .. } => {
                self.marks += 1;
                self.abandoned += self.stack.depth() as u64;
                self.stack.reset();
            }
        }
    }

    /// Frames still open at end of input
    pub fn unterminated(&self) -> usize {
        self.stack.depth()
    }

    pub fn max_depth(&self) -> usize {
        self.stack.max_depth()
    }

    /// Every return matched and nothing was left open
    pub fn is_balanced(&self) -> bool {
        self.orphan_returns == 0 && self.abandoned == 0 && self.stack.is_empty()
    }

    pub fn method(&self, name: &str) -> Option<&MethodStats> {
        self.methods.get(name)
    }

    /// Methods sorted by call count (descending), then name
    pub fn sorted_methods(&self) -> Vec<(&str, &MethodStats)> {
        let mut sorted: Vec<_> = self
            .methods
            .iter()
            .map(|(name, stats)| (name.as_str(), stats))
            .collect();
        sorted.sort_by(|a, b| b.1.calls.cmp(&a.1.calls).then_with(|| a.0.cmp(b.0)));
        sorted
    }

    pub fn write_summary<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        if self.methods.is_empty() {
            writeln!(out, "No calls recorded.")?;
            return Ok(());
        }

        writeln!(out, "{:>9} {:>9} method", "calls", "orphans")?;
        writeln!(out, "--------- --------- ----------------")?;
        for (name, stats) in self.sorted_methods() {
            let orphans = if stats.orphan_returns > 0 {
                stats.orphan_returns.to_string()
            } else {
                String::new()
            };
            writeln!(out, "{:>9} {:>9} {}", stats.calls, orphans, name)?;
        }
        writeln!(out, "--------- --------- ----------------")?;
        writeln!(out, "{:>9} {:>9} total", self.calls, self.orphan_returns)?;
        writeln!(out)?;
        writeln!(
            out,
            "returns: {}  marks: {}  max depth: {}  unterminated: {}  abandoned: {}",
            self.returns,
            self.marks,
            self.max_depth(),
            self.unterminated(),
            self.abandoned
        )?;
        writeln!(
            out,
            "balance: {}",
            if self.is_balanced() { "ok" } else { "unbalanced" }
        )
    }

    /// Print the summary table to stderr
    pub fn print_summary(&self) {
        let mut stderr = std::io::stderr().lock();
        if let Err(e) = self.write_summary(&mut stderr) {
            tracing::warn!(error = %e, "failed to write stats summary");
        }
    }
}
