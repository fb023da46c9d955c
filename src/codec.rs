//! Tabular row format for attribution records
//!
//! Every output stream starts with a header row naming the columns in use.
//! Fields containing the delimiter, a quote or a line break are wrapped in
//! quotes with embedded quotes doubled. Numbers are plain decimal.
//!
//! Segment boundaries are written as `---,<label>` rows. Readers also accept
//! the older `--- label` line form.

use crate::error::{Result, TraceError};
use crate::event::MARK_SENTINEL;
use crate::frame::{Frame, MethodLevel};
use crate::record::Record;
use std::borrow::Cow;
use std::io::BufRead;

/// One output column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Entity,
    MethodName,
    MethodLevel,
    Filepath,
    Lineno,
    CallerEntity,
    CallerMethodName,
    CallerMethodLevel,
}

/// Full 8-column layout
pub const DETAILED_COLUMNS: &[Column] = &[
    Column::Entity,
    Column::MethodName,
    Column::MethodLevel,
    Column::Filepath,
    Column::Lineno,
    Column::CallerEntity,
    Column::CallerMethodName,
    Column::CallerMethodLevel,
];

/// Reduced layout: who called whom, without levels or locations
pub const COMPACT_COLUMNS: &[Column] = &[
    Column::Entity,
    Column::MethodName,
    Column::CallerEntity,
    Column::CallerMethodName,
];

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Entity => "entity",
            Column::MethodName => "method_name",
            Column::MethodLevel => "method_level",
            Column::Filepath => "filepath",
            Column::Lineno => "lineno",
            Column::CallerEntity => "caller_entity",
            Column::CallerMethodName => "caller_method_name",
            Column::CallerMethodLevel => "caller_method_level",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        DETAILED_COLUMNS.iter().copied().find(|c| c.name() == name)
    }
}

/// Escape a field (handle commas, quotes, newlines)
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Split one logical row into unescaped fields
pub fn split_row(row: &str, line: usize) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = row.chars().peekable();
    let mut in_quotes = false;
    let mut quoted = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            ',' => {
                fields.push(std::mem::take(&mut field));
                quoted = false;
            }
            '"' if field.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            '"' => {
                return Err(TraceError::malformed(line, "stray quote inside field"));
            }
            _ if quoted => {
                return Err(TraceError::malformed(
                    line,
                    "unexpected character after closing quote",
                ));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(TraceError::malformed(line, "unterminated quoted field"));
    }

    fields.push(field);
    Ok(fields)
}

/// Mark row for `label`
pub fn encode_mark(label: &str) -> String {
    format!("{},{}", MARK_SENTINEL, escape_field(label))
}

/// `--- label` or bare `---` line
fn is_legacy_mark(line: &str) -> bool {
    line == MARK_SENTINEL || line.starts_with("--- ")
}

/// Label of a mark row, if `row` is one
pub fn mark_label(row: &str, line: usize) -> Result<Option<String>> {
    if let Some(rest) = row.strip_prefix("--- ") {
        return Ok(Some(rest.to_string()));
    }
    if row == MARK_SENTINEL {
        return Ok(Some(String::new()));
    }
    if row.starts_with("---,") {
        let mut fields = split_row(row, line)?;
        let label = if fields.len() > 1 {
            fields.swap_remove(1)
        } else {
            String::new()
        };
        return Ok(Some(label));
    }
    Ok(None)
}

/// Encoder for a fixed column layout
#[derive(Debug, Clone)]
pub struct RecordCodec {
    columns: Vec<Column>,
}

impl RecordCodec {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(TraceError::InvalidConfiguration(
                "output requires at least one column".to_string(),
            ));
        }
        Ok(Self { columns })
    }

    pub fn detailed() -> Self {
        Self {
            columns: DETAILED_COLUMNS.to_vec(),
        }
    }

    pub fn compact() -> Self {
        Self {
            columns: COMPACT_COLUMNS.to_vec(),
        }
    }

    pub fn for_output(detailed: bool) -> Self {
        if detailed {
            Self::detailed()
        } else {
            Self::compact()
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Header row (no trailing newline)
    pub fn header(&self) -> String {
        self.columns
            .iter()
            .map(Column::name)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Format a record as a row (no trailing newline)
    pub fn encode(&self, record: &Record) -> String {
        let mut row = String::with_capacity(128);
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                row.push(',');
            }
            match column {
                Column::Entity => row.push_str(&escape_field(&record.callee.entity)),
                Column::MethodName => row.push_str(&escape_field(&record.callee.method_name)),
                Column::MethodLevel => row.push_str(record.callee.method_level.as_str()),
                Column::Filepath => row.push_str(&escape_field(&record.callee.filepath)),
                Column::Lineno => row.push_str(&record.callee.lineno.to_string()),
                Column::CallerEntity => row.push_str(&escape_field(&record.caller.entity)),
                Column::CallerMethodName => {
                    row.push_str(&escape_field(&record.caller.method_name))
                }
                Column::CallerMethodLevel => row.push_str(record.caller.method_level.as_str()),
            }
        }
        row
    }
}

/// A decoded output row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRow {
    Record(Record),
    Mark(String),
}

/// Decoder driven by a header row
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    columns: Vec<Column>,
}

impl RecordDecoder {
    /// Build a decoder from the header row of a stream
    pub fn from_header(header: &str) -> Result<Self> {
        let names = split_row(header, 1)?;
        let mut columns = Vec::with_capacity(names.len());
        for name in &names {
            let column = Column::from_name(name.trim())
                .ok_or_else(|| TraceError::malformed(1, format!("unknown column '{}'", name)))?;
            columns.push(column);
        }

        for required in [Column::Entity, Column::MethodName] {
            if !columns.contains(&required) {
                return Err(TraceError::malformed(
                    1,
                    format!("header lacks required column '{}'", required.name()),
                ));
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Decode one logical row
    pub fn decode(&self, row: &str, line: usize) -> Result<OutputRow> {
        if let Some(label) = mark_label(row, line)? {
            return Ok(OutputRow::Mark(label));
        }

        let fields = split_row(row, line)?;
        if fields.len() < self.columns.len() {
            let missing = self.columns[fields.len()];
            return Err(TraceError::malformed(
                line,
                format!("missing column '{}'", missing.name()),
            ));
        }
        if fields.len() > self.columns.len() {
            return Err(TraceError::malformed(
                line,
                format!(
                    "expected {} fields, found {}",
                    self.columns.len(),
                    fields.len()
                ),
            ));
        }

        let mut callee = Frame::new("", "", MethodLevel::Instance, "", 0);
        let mut caller = Frame::root();
        for (column, value) in self.columns.iter().zip(fields) {
            match column {
                Column::Entity => callee.entity = value,
                Column::MethodName => callee.method_name = value,
                Column::MethodLevel => callee.method_level = parse_level(&value, line)?,
                Column::Filepath => callee.filepath = value,
                Column::Lineno => callee.lineno = parse_lineno(&value, line)?,
                Column::CallerEntity => caller.entity = value,
                Column::CallerMethodName => caller.method_name = value,
                Column::CallerMethodLevel => caller.method_level = parse_level(&value, line)?,
            }
        }

        Ok(OutputRow::Record(Record::new(callee, caller)))
    }
}

pub(crate) fn parse_level(value: &str, line: usize) -> Result<MethodLevel> {
    MethodLevel::parse(value)
        .ok_or_else(|| TraceError::malformed(line, format!("invalid method level '{}'", value)))
}

pub(crate) fn parse_lineno(value: &str, line: usize) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|_| TraceError::malformed(line, format!("invalid line number '{}'", value)))
}

/// Reads logical rows, joining physical lines inside quoted fields
#[derive(Debug)]
pub struct RowReader<R> {
    reader: R,
    line: usize,
}

impl<R: BufRead> RowReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: 0 }
    }

    /// Next row with the line number it started on, or None at end of input
    pub fn next_row(&mut self) -> Result<Option<(usize, String)>> {
        let mut row = String::new();
        let mut start = 0;

        loop {
            let mut buf = String::new();
            let read = self.reader.read_line(&mut buf)?;
            if read == 0 {
                if row.is_empty() {
                    return Ok(None);
                }
                return Err(TraceError::malformed(start, "unterminated quoted field"));
            }
            self.line += 1;
            let first = row.is_empty();
            if first {
                start = self.line;
            }
            row.push_str(&buf);

            // legacy mark labels are written raw and may hold a lone quote
            if first && is_legacy_mark(buf.trim_end_matches(['\r', '\n'])) {
                break;
            }
            if row.matches('"').count() % 2 == 0 {
                break;
            }
        }

        if row.ends_with('\n') {
            row.pop();
            if row.ends_with('\r') {
                row.pop();
            }
        }
        Ok(Some((start, row)))
    }
}
