// Configuration for recorders and the flatten pass
//
// Loaded from TOML and overridden by command line flags. Every field has a
// default so an empty file is a valid configuration.

use crate::codec::RecordCodec;
use crate::error::{Result, TraceError};
use crate::filter::{ExclusionPolicy, PathFilter};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Entity name the recorder reports for its own frames
pub const RECORDER_ENTITY: &str = "shadowtrace::Recorder";

/// How the streaming recorder learns each call's caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerResolution {
    /// Derive callers from an internal shadow stack
    #[default]
    Tracked,
    /// Use the caller carried by each call event
    Supplied,
}

/// Recording and reconstruction options
///
/// # Example
/// ```
/// use shadowtrace::config::TraceConfig;
///
/// let config: TraceConfig = toml::from_str(r#"
///     exclude_patterns = ["/gems/", 'regex:_spec\.rb$']
///     detailed_output = false
/// "#).unwrap();
/// assert!(config.validate().is_ok());
/// assert!(config.include_patterns.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Paths whose records are suppressed (literal substrings, or `regex:` prefixed)
    pub exclude_patterns: Vec<String>,

    /// When non-empty, only paths matching one of these are emitted
    pub include_patterns: Vec<String>,

    /// Full 8-column rows instead of the reduced 4-column form
    pub detailed_output: bool,

    /// Label used by marks that do not carry their own
    pub mark_label: String,

    /// Which frame's path is filtered. Unset means `caller` for the
    /// streaming recorder and `callee` for flatten.
    pub exclusion_policy: Option<ExclusionPolicy>,

    pub caller_resolution: CallerResolution,

    /// Emit each distinct row once
    pub unique: bool,

    /// Calls into this entity are never recorded
    pub self_entity: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            include_patterns: Vec::new(),
            detailed_output: true,
            mark_label: String::new(),
            exclusion_policy: None,
            caller_resolution: CallerResolution::Tracked,
            unique: false,
            self_entity: RECORDER_ENTITY.to_string(),
        }
    }
}

impl TraceConfig {
    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: TraceConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.path_filter()?;
        if self.self_entity.is_empty() {
            return Err(TraceError::InvalidConfiguration(
                "self_entity must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn path_filter(&self) -> Result<PathFilter> {
        PathFilter::new(&self.exclude_patterns, &self.include_patterns)
    }

    pub fn codec(&self) -> RecordCodec {
        RecordCodec::for_output(self.detailed_output)
    }

    /// Policy for the streaming recorder
    pub fn recorder_policy(&self) -> ExclusionPolicy {
        self.exclusion_policy.unwrap_or(ExclusionPolicy::Caller)
    }

    /// Policy for the flatten pass
    pub fn flatten_policy(&self) -> ExclusionPolicy {
        self.exclusion_policy.unwrap_or(ExclusionPolicy::Callee)
    }
}
