//! Batch reconstruction ("flatten")
//!
//! Replays an unfiltered raw event log through a shadow stack and writes one
//! attribution row per emitted call. Filtering is applied only when rows are
//! emitted, so excluded calls still take part in stack bookkeeping.
//!
//! # Algorithm
//!
//! 1. Start each log with an empty stack
//! 2. `---` rows reset the stack and produce no output
//! 3. A call is attributed, emitted unless filtered, then pushed
//! 4. A return pops only when it matches the top frame
//! 5. Frames still open at end of input are reported, not rejected

use crate::attribution::Attributor;
use crate::codec::RecordCodec;
use crate::config::TraceConfig;
use crate::dedup::RowMemo;
use crate::error::{Result, TraceError};
use crate::event::Event;
use crate::raw_log::RawLogReader;
use crate::record::Record;
use crate::session::{Session, Sink};
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;

/// Output format for flattened records
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// CSV with a header row (default)
    Csv,
    /// One JSON object per line
    Json,
}

/// Counters for one flatten pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlattenSummary {
    pub calls: u64,
    pub returns: u64,
    pub marks: u64,
    /// Rows written
    pub emitted: u64,
    pub orphan_returns: u64,
    /// Frames still open at end of input
    pub unterminated: usize,
    pub max_depth: usize,
}

/// Attribution state for one pass, without any I/O
#[derive(Debug)]
pub struct Reconstruction {
    attributor: Attributor,
    summary: FlattenSummary,
}

impl Reconstruction {
    pub fn new(config: &TraceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            attributor: Attributor::new(config.path_filter()?, config.flatten_policy()),
            summary: FlattenSummary::default(),
        })
    }

    /// Apply one event; returns the record to emit, if any
    pub fn observe(&mut self, event: Event) -> Option<Record> {
        match event {
            Event::Mark { .. } => {
                self.summary.marks += 1;
                self.attributor.reset();
                None
            }
            Event::Call { frame, .. } => {
                self.summary.calls += 1;
                self.attributor.on_call(frame)
            }
            Event::Return { frame } => {
                self.summary.returns += 1;
                self.attributor.on_return(&frame);
                None
            }
        }
    }

    pub fn summary(&self) -> FlattenSummary {
        let stack = self.attributor.stack();
        FlattenSummary {
            orphan_returns: self.attributor.orphans(),
            unterminated: stack.depth(),
            max_depth: stack.max_depth(),
            ..self.summary
        }
    }
}

/// Reconstruct records from an in-memory event sequence
pub fn flatten_events<I>(config: &TraceConfig, events: I) -> Result<Vec<Record>>
where
    I: IntoIterator<Item = Event>,
{
    let mut pass = Reconstruction::new(config)?;
    Ok(events
        .into_iter()
        .filter_map(|event| pass.observe(event))
        .collect())
}

/// Writes flattened records for one or more raw logs to a sink
#[derive(Debug)]
pub struct Flattener {
    session: Session,
    config: TraceConfig,
    codec: RecordCodec,
    format: OutputFormat,
    memo: Option<RowMemo>,
}

impl Flattener {
    /// Create a flattener and write the header row (CSV output)
    pub fn new(sink: Sink, config: &TraceConfig, format: OutputFormat) -> Result<Self> {
        config.validate()?;

        let mut flattener = Self {
            session: Session::new(sink),
            config: config.clone(),
            codec: config.codec(),
            format,
            memo: config.unique.then(RowMemo::new),
        };

        if format == OutputFormat::Csv {
            let header = flattener.codec.header();
            flattener.session.write_line(&header)?;
        }
        Ok(flattener)
    }

    pub fn create(path: impl AsRef<Path>, config: &TraceConfig, format: OutputFormat) -> Result<Self> {
        Self::new(Sink::create(path)?, config, format)
    }

    /// Flatten one raw log. Each log starts from an empty stack.
    ///
    /// A malformed row aborts the pass with `MalformedRecord`.
    pub fn flatten<R: BufRead>(&mut self, input: R) -> Result<FlattenSummary> {
        if self.session.is_closed() {
            return Err(TraceError::IoClosed);
        }

        let mut pass = Reconstruction::new(&self.config)?;
        let mut emitted = 0;

        for event in RawLogReader::new(input)? {
            if let Some(record) = pass.observe(event?) {
                if self.emit(&record)? {
                    emitted += 1;
                }
            }
        }

        let summary = FlattenSummary {
            emitted,
            ..pass.summary()
        };
        tracing::info!(
            calls = summary.calls,
            returns = summary.returns,
            emitted = summary.emitted,
            orphans = summary.orphan_returns,
            unterminated = summary.unterminated,
            "flatten pass complete"
        );
        Ok(summary)
    }

    /// Flatten a raw log file (`.gz` is decompressed)
    pub fn flatten_file(&mut self, path: impl AsRef<Path>) -> Result<FlattenSummary> {
        self.flatten(crate::raw_log::open_input(path)?)
    }

    fn emit(&mut self, record: &Record) -> Result<bool> {
        let row = match self.format {
            OutputFormat::Csv => self.codec.encode(record),
            OutputFormat::Json => serde_json::to_string(record)?,
        };
        if let Some(memo) = self.memo.as_mut() {
            if !memo.first_sighting(&row) {
                return Ok(false);
            }
        }
        self.session.write_line(&row)?;
        Ok(true)
    }

    /// Idempotent
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }
}
