//! Raw event log
//!
//! The unfiltered companion of the streaming recorder: every call, return
//! and mark is appended as one row, and attribution is recomputed later by
//! the flatten pass.
//!
//! Format: header `event,entity,method_name,method_level,filepath,lineno`,
//! then one row per event. The `event` column holds `call`, `return` or the
//! mark sentinel `---`; a mark row carries its label in the second field.

use crate::codec::{
    encode_mark, escape_field, mark_label, parse_level, parse_lineno, split_row, RowReader,
};
use crate::error::{Result, TraceError};
use crate::event::{Event, EventKind};
use crate::frame::{Frame, MethodLevel};
use crate::session::{Session, Sink};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub const RAW_HEADER: &str = "event,entity,method_name,method_level,filepath,lineno";

/// Open a raw log for reading, decompressing `.gz` files
pub fn open_input(path: impl AsRef<Path>) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn encode_event(event: &Event) -> String {
    let (kind, frame) = match event {
        Event::Call { frame, .. } => (EventKind::Call, frame),
        Event::Return { frame } => (EventKind::Return, frame),
        Event::Mark { label } => return encode_mark(label),
    };
    format!(
        "{},{},{},{},{},{}",
        kind.as_str(),
        escape_field(&frame.entity),
        escape_field(&frame.method_name),
        frame.method_level,
        escape_field(&frame.filepath),
        frame.lineno
    )
}

/// Appends every event, unfiltered
#[derive(Debug)]
pub struct RawLogWriter {
    session: Session,
    events: u64,
}

impl RawLogWriter {
    pub fn new(sink: Sink) -> Result<Self> {
        let mut session = Session::new(sink);
        session.write_line(RAW_HEADER)?;
        Ok(Self { session, events: 0 })
    }

    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Sink::create(path)?)
    }

    pub fn record(&mut self, event: &Event) -> Result<()> {
        self.session.write_line(&encode_event(event))?;
        if self.session.is_current() {
            self.events += 1;
        }
        Ok(())
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn flush(&mut self) -> Result<()> {
        self.session.flush()
    }

    /// Idempotent
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}

/// Column positions declared by a raw log header
#[derive(Debug, Clone)]
struct RawLayout {
    width: usize,
    event: usize,
    entity: usize,
    method_name: usize,
    method_level: Option<usize>,
    filepath: Option<usize>,
    lineno: Option<usize>,
}

impl RawLayout {
    fn from_header(header: &str, line: usize) -> Result<Self> {
        let names = split_row(header, line)?;
        let find = |name: &str| names.iter().position(|n| n.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                TraceError::malformed(line, format!("header lacks required column '{}'", name))
            })
        };

        Ok(Self {
            width: names.len(),
            event: require("event")?,
            entity: require("entity")?,
            method_name: require("method_name")?,
            method_level: find("method_level"),
            filepath: find("filepath"),
            lineno: find("lineno"),
        })
    }

    fn column_name(&self, index: usize) -> &'static str {
        match index {
            i if i == self.event => "event",
            i if i == self.entity => "entity",
            i if i == self.method_name => "method_name",
            i if Some(i) == self.method_level => "method_level",
            i if Some(i) == self.filepath => "filepath",
            i if Some(i) == self.lineno => "lineno",
            _ => "unnamed",
        }
    }
}

/// Reads events back from a raw log
pub struct RawLogReader<R> {
    rows: RowReader<R>,
    layout: RawLayout,
    failed: bool,
}

impl RawLogReader<Box<dyn BufRead>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(open_input(path)?)
    }
}

impl<R: BufRead> RawLogReader<R> {
    /// Read the header row and prepare to decode events
    pub fn new(reader: R) -> Result<Self> {
        let mut rows = RowReader::new(reader);
        let (line, header) = rows
            .next_row()?
            .ok_or_else(|| TraceError::malformed(1, "missing header row"))?;
        let layout = RawLayout::from_header(&header, line)?;
        Ok(Self {
            rows,
            layout,
            failed: false,
        })
    }

    /// Next event with the line it started on
    pub fn next_event(&mut self) -> Result<Option<(usize, Event)>> {
        loop {
            let Some((line, row)) = self.rows.next_row()? else {
                return Ok(None);
            };
            if row.is_empty() {
                continue;
            }
            if let Some(label) = mark_label(&row, line)? {
                return Ok(Some((line, Event::Mark { label })));
            }
            return self.decode(&row, line).map(|event| Some((line, event)));
        }
    }

    fn decode(&self, row: &str, line: usize) -> Result<Event> {
        let layout = &self.layout;
        let fields = split_row(row, line)?;
        if fields.len() < layout.width {
            return Err(TraceError::malformed(
                line,
                format!("missing column '{}'", layout.column_name(fields.len())),
            ));
        }
        if fields.len() > layout.width {
            return Err(TraceError::malformed(
                line,
                format!("expected {} fields, found {}", layout.width, fields.len()),
            ));
        }

        let kind = EventKind::parse(&fields[layout.event]).ok_or_else(|| {
            TraceError::malformed(line, format!("unknown event '{}'", fields[layout.event]))
        })?;
        // Only reachable when `event` is not the first column
        if kind == EventKind::Mark {
            return Ok(Event::Mark {
                label: String::new(),
            });
        }

        let entity = &fields[layout.entity];
        let method_name = &fields[layout.method_name];
        if entity.is_empty() || method_name.is_empty() {
            return Err(TraceError::malformed(line, "empty entity or method_name"));
        }

        let method_level = match layout.method_level {
            Some(i) => parse_level(&fields[i], line)?,
            None => MethodLevel::Instance,
        };
        let filepath = layout.filepath.map(|i| fields[i].clone()).unwrap_or_default();
        let lineno = match layout.lineno {
            Some(i) => parse_lineno(&fields[i], line)?,
            None => 0,
        };

        let frame = Frame::new(entity.clone(), method_name.clone(), method_level, filepath, lineno);
        Ok(match kind {
            EventKind::Return => Event::ret(frame),
            _ => Event::call(frame),
        })
    }
}

impl<R: BufRead> Iterator for RawLogReader<R> {
    type Item = Result<Event>;

    /// Stops after the first error
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_event() {
            Ok(Some((_, event))) => Some(Ok(event)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
