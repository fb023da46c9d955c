//! Shadowtrace - call-stack attribution from call/return/mark event streams
//!
//! This library reconstructs a caller for every recorded method call by
//! replaying call and return events through a shadow stack. Records can be
//! produced while the program runs (`recorder`) or recomputed afterwards
//! from an unfiltered raw log (`raw_log` + `flatten`), with path exclusion
//! applied only at emission time.

pub mod attribution;
pub mod cli;
pub mod codec;
pub mod config;
pub mod dedup;
pub mod error;
pub mod event;
pub mod filter;
pub mod flatten;
pub mod frame;
pub mod raw_log;
pub mod record;
pub mod recorder;
pub mod session;
pub mod shadow_stack;
pub mod stats;

pub use error::{Result, TraceError};
