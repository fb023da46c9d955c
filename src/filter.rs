//! Path filtering for emitted records
//!
//! Supports:
//! - Exclusion patterns: a record is suppressed when its path matches any
//! - Inclusion patterns: when given, a record is suppressed unless its path matches one
//! - Literal patterns (`/gems/`, `/usr/lib/ruby`) match as substrings
//! - Regex patterns carry a `regex:` prefix (`regex:_spec\.rb$`)

use crate::error::{Result, TraceError};
use crate::frame::Frame;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

/// Which frame's file path the filter is tested against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExclusionPolicy {
    /// Test the called frame's defining file
    Callee,
    /// Test the calling frame's file (the call site)
    Caller,
}

impl ExclusionPolicy {
    /// Path the filter should look at for a call of `callee` from `caller`
    pub fn subject<'a>(&self, callee: &'a Frame, caller: &'a Frame) -> &'a str {
        match self {
            ExclusionPolicy::Callee => &callee.filepath,
            ExclusionPolicy::Caller => &caller.filepath,
        }
    }
}

/// Exclusion and inclusion predicates over file paths
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    /// None = nothing excluded
    exclude: Option<RegexSet>,
    /// None = everything included
    include: Option<RegexSet>,
}

impl PathFilter {
    /// Filter that suppresses nothing
    pub fn none() -> Self {
        Self::default()
    }

    /// Build a filter from exclusion and inclusion pattern lists
    pub fn new<S: AsRef<str>>(exclude: &[S], include: &[S]) -> Result<Self> {
        Ok(Self {
            exclude: compile(exclude)?,
            include: compile(include)?,
        })
    }

    pub fn excluded(&self, path: &str) -> bool {
        match &self.exclude {
            None => false,
            Some(set) => set.is_match(path),
        }
    }

    pub fn included(&self, path: &str) -> bool {
        match &self.include {
            None => true,
            Some(set) => set.is_match(path),
        }
    }

    /// A path is suppressed when excluded or not included
    pub fn suppresses(&self, path: &str) -> bool {
        self.excluded(path) || !self.included(path)
    }

    pub fn is_passthrough(&self) -> bool {
        self.exclude.is_none() && self.include.is_none()
    }
}

/// Prefix marking a pattern as a regular expression
pub const REGEX_PREFIX: &str = "regex:";

/// Translate one pattern into regex source
fn pattern_source(pattern: &str) -> Result<String> {
    match pattern.strip_prefix(REGEX_PREFIX) {
        Some("") => Err(TraceError::InvalidConfiguration(
            "empty regex filter pattern".to_string(),
        )),
        Some(body) => Ok(body.to_string()),
        None if pattern.is_empty() => Err(TraceError::InvalidConfiguration(
            "empty filter pattern".to_string(),
        )),
        None => Ok(regex::escape(pattern)),
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Option<RegexSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let sources = patterns
        .iter()
        .map(|p| pattern_source(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    RegexSet::new(&sources)
        .map(Some)
        .map_err(|e| TraceError::InvalidConfiguration(format!("invalid filter pattern: {}", e)))
}
