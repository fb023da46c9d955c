//! Frame identity for call and return events
//!
//! A frame names a call target: the receiver's effective type (`entity`),
//! the method name, whether it was dispatched on the type itself or on an
//! instance, and the source location the event source attached to it.
//!
//! Matching a return against an open call only compares `entity` and
//! `method_name`. The level and location are carried along for output but a
//! method that is looked up again and re-entered through another dispatch
//! path must still pop its own frame.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity name of the synthetic caller used when no frame is open
pub const ROOT_ENTITY: &str = "<ROOT>";

/// Placeholder for method names and levels that are not known
pub const UNKNOWN: &str = "<UNKNOWN>";

/// Dispatch level of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodLevel {
    /// Method defined on the type itself (singleton / static)
    Class,
    /// Method dispatched on an instance
    Instance,
    /// Only used by the ROOT sentinel
    #[serde(rename = "<UNKNOWN>")]
    Unknown,
}

impl MethodLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodLevel::Class => "class",
            MethodLevel::Instance => "instance",
            MethodLevel::Unknown => UNKNOWN,
        }
    }

    /// Parse the textual level written by the codecs
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "class" => Some(MethodLevel::Class),
            "instance" => Some(MethodLevel::Instance),
            UNKNOWN => Some(MethodLevel::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for MethodLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call target as reported by the instrumentation source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame {
    pub entity: String,
    pub method_name: String,
    pub method_level: MethodLevel,
    /// Defining file; unknown paths are the empty string
    pub filepath: String,
    pub lineno: i64,
}

impl Frame {
    pub fn new(
        entity: impl Into<String>,
        method_name: impl Into<String>,
        method_level: MethodLevel,
        filepath: impl Into<String>,
        lineno: i64,
    ) -> Self {
        Self {
            entity: entity.into(),
            method_name: method_name.into(),
            method_level,
            filepath: filepath.into(),
            lineno,
        }
    }

    /// Frame carrying only the identity key, as return events do
    pub fn identity(entity: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self::new(entity, method_name, MethodLevel::Instance, "", 0)
    }

    /// The ROOT sentinel assigned as caller when the shadow stack is empty
    pub fn root() -> Self {
        Self::new(ROOT_ENTITY, UNKNOWN, MethodLevel::Unknown, "", 0)
    }

    pub fn is_root(&self) -> bool {
        self.entity == ROOT_ENTITY
            && self.method_name == UNKNOWN
            && self.method_level == MethodLevel::Unknown
    }

    /// Identity equality: same entity and method name.
    ///
    /// Level, file and line are ignored.
    pub fn same_method(&self, other: &Frame) -> bool {
        self.entity == other.entity && self.method_name == other.method_name
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = match self.method_level {
            MethodLevel::Class => ".",
            _ => "#",
        };
        write!(f, "{}{}{}", self.entity, sep, self.method_name)
    }
}
