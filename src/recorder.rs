//! Streaming recorder
//!
//! Turns call events into attribution rows as they arrive. The caller of
//! each call is either supplied by the event source or derived from a
//! shadow stack kept here (`CallerResolution`). Filtering only decides what
//! is written: in tracked mode a suppressed call is still pushed, so its
//! return still matches and its children attribute to a real ancestor.
//!
//! A recorder starts out open but not tracing; events are ignored until
//! `start_trace` (or inside `trace`).

use crate::attribution::Attributor;
use crate::codec::{encode_mark, RecordCodec};
use crate::config::{CallerResolution, TraceConfig};
use crate::dedup::RowMemo;
use crate::error::{Result, TraceError};
use crate::event::Event;
use crate::frame::Frame;
use crate::record::Record;
use crate::session::{Session, Sink};
use std::path::Path;

/// Lifecycle state of a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Sink open, events ignored
    Open,
    /// Sink open, events recorded
    Tracing,
    Closed,
}

#[derive(Debug)]
pub struct Recorder {
    session: Session,
    codec: RecordCodec,
    attributor: Attributor,
    resolution: CallerResolution,
    memo: Option<RowMemo>,
    mark_label: String,
    self_entity: String,
    tracing: bool,
    emitted: u64,
}

impl Recorder {
    /// Create a recorder over `sink` and write the header row
    pub fn new(sink: Sink, config: &TraceConfig) -> Result<Self> {
        config.validate()?;

        let mut recorder = Self {
            session: Session::new(sink),
            codec: config.codec(),
            attributor: Attributor::new(config.path_filter()?, config.recorder_policy()),
            resolution: config.caller_resolution,
            memo: config.unique.then(RowMemo::new),
            mark_label: config.mark_label.clone(),
            self_entity: config.self_entity.clone(),
            tracing: false,
            emitted: 0,
        };

        let header = recorder.codec.header();
        recorder.session.write_line(&header)?;
        Ok(recorder)
    }

    /// Create a recorder writing to `path` (gzip when it ends in `.gz`)
    pub fn create(path: impl AsRef<Path>, config: &TraceConfig) -> Result<Self> {
        Self::new(Sink::create(path)?, config)
    }

    pub fn state(&self) -> SessionState {
        if self.session.is_closed() {
            SessionState::Closed
        } else if self.tracing {
            SessionState::Tracing
        } else {
            SessionState::Open
        }
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing && !self.session.is_closed()
    }

    pub fn start_trace(&mut self) {
        if !self.session.is_closed() {
            self.tracing = true;
        }
    }

    pub fn stop_trace(&mut self) {
        self.tracing = false;
    }

    /// Run `f` with tracing enabled; tracing is stopped again however `f` exits
    pub fn trace<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.start_trace();
        let result = f(self);
        self.stop_trace();
        result
    }

    /// Feed one event
    pub fn record(&mut self, event: Event) -> Result<()> {
        if self.session.is_closed() {
            return Err(TraceError::IoClosed);
        }

        match event {
            Event::Mark { label } => self.mark(Some(&label)),
            _ if !self.tracing => Ok(()),
            _ if !self.session.is_current() => {
                tracing::trace!("dropping event observed outside the owning thread");
                Ok(())
            }
            Event::Call { frame, caller } => self.on_call(frame, caller),
            Event::Return { frame } => {
                self.on_return(&frame);
                Ok(())
            }
        }
    }

    fn on_call(&mut self, frame: Frame, supplied: Option<Frame>) -> Result<()> {
        if frame.entity == self.self_entity {
            return Ok(());
        }

        let record = match self.resolution {
            CallerResolution::Tracked => self.attributor.on_call(frame),
            CallerResolution::Supplied => {
                let caller = supplied.unwrap_or_else(Frame::root);
                if self.attributor.suppresses(&frame, &caller) {
                    None
                } else {
                    Some(Record::new(frame, caller))
                }
            }
        };

        match record {
            Some(record) => self.emit(record),
            None => Ok(()),
        }
    }

    fn on_return(&mut self, frame: &Frame) {
        if self.resolution == CallerResolution::Tracked && frame.entity != self.self_entity {
            self.attributor.on_return(frame);
        }
    }

    fn emit(&mut self, record: Record) -> Result<()> {
        if !self.session.is_current() {
            return Ok(());
        }
        let row = self.codec.encode(&record);
        if let Some(memo) = self.memo.as_mut() {
            if !memo.first_sighting(&row) {
                return Ok(());
            }
        }
        self.session.write_line(&row)?;
        self.emitted += 1;
        Ok(())
    }

    /// Write a segment boundary and reset the shadow stack.
    ///
    /// `None` uses the configured mark label. Tracing is paused while the
    /// row is written.
    pub fn mark(&mut self, label: Option<&str>) -> Result<()> {
        if self.session.is_closed() {
            return Err(TraceError::IoClosed);
        }
        if !self.session.is_current() {
            return Ok(());
        }

        let was_tracing = self.tracing;
        self.tracing = false;

        let row = encode_mark(label.unwrap_or(&self.mark_label));
        let result = self.session.write_line(&row);
        self.attributor.reset();

        self.tracing = was_tracing;
        result
    }

    pub fn flush(&mut self) -> Result<()> {
        self.session.flush()
    }

    /// Stop tracing and close the sink. Idempotent.
    ///
    /// A close from a thread that does not own the session leaves the
    /// recorder untouched.
    pub fn close(&mut self) -> Result<()> {
        if self.session.is_current() {
            self.tracing = false;
        }
        self.session.close()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// Rows written so far, excluding header and marks
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Current shadow stack depth (always 0 in supplied mode)
    pub fn depth(&self) -> usize {
        self.attributor.stack().depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ExclusionPolicy;
    use crate::frame::MethodLevel;
    use crate::session::test_support::SharedBuffer;

    fn call(entity: &str, method: &str, path: &str) -> Event {
        Event::call(Frame::new(entity, method, MethodLevel::Instance, path, 1))
    }

    fn ret(entity: &str, method: &str) -> Event {
        Event::ret(Frame::identity(entity, method))
    }

    fn recorder(config: &TraceConfig) -> (Recorder, SharedBuffer) {
        let buf = SharedBuffer::default();
        let rec = Recorder::new(Sink::from_writer(buf.clone()), config).unwrap();
        (rec, buf)
    }

    fn compact() -> TraceConfig {
        TraceConfig {
            detailed_output: false,
            ..TraceConfig::default()
        }
    }

    fn lines(buf: &SharedBuffer) -> Vec<String> {
        buf.contents().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_header_written_on_creation() {
        let (_rec, buf) = recorder(&TraceConfig::default());
        assert_eq!(
            lines(&buf),
            vec!["entity,method_name,method_level,filepath,lineno,caller_entity,caller_method_name,caller_method_level"]
        );
    }

    #[test]
    fn test_state_transitions() {
        let (mut rec, _buf) = recorder(&compact());
        assert_eq!(rec.state(), SessionState::Open);
        rec.trace(|r| {
            assert_eq!(r.state(), SessionState::Tracing);
            Ok(())
        })
        .unwrap();
        assert_eq!(rec.state(), SessionState::Open);
        rec.close().unwrap();
        assert_eq!(rec.state(), SessionState::Closed);
        rec.start_trace();
        assert_eq!(rec.state(), SessionState::Closed);
    }

    #[test]
    fn test_events_ignored_until_started() {
        let (mut rec, buf) = recorder(&compact());
        rec.record(call("Example", "normal_method", "/t.rb")).unwrap();
        assert_eq!(lines(&buf).len(), 1);
        assert_eq!(rec.emitted(), 0);
    }

    #[test]
    fn test_stop_trace_before_start_is_noop() {
        let (mut rec, _buf) = recorder(&compact());
        rec.stop_trace();
        assert_eq!(rec.state(), SessionState::Open);
    }

    #[test]
    fn test_tracked_attribution() {
        let (mut rec, buf) = recorder(&compact());
        rec.trace(|r| {
            r.record(call("Example", "new", "/t.rb"))?;
            r.record(call("Example", "initialize", "/t.rb"))?;
            r.record(ret("Example", "initialize"))?;
            r.record(ret("Example", "new"))?;
            r.record(call("Example", "normal_method", "/t.rb"))
        })
        .unwrap();

        assert_eq!(
            lines(&buf)[1..],
            [
                "Example,new,<ROOT>,<UNKNOWN>",
                "Example,initialize,Example,new",
                "Example,normal_method,<ROOT>,<UNKNOWN>",
            ]
        );
        assert_eq!(rec.emitted(), 3);
    }

    #[test]
    fn test_supplied_callers_are_used_verbatim() {
        let config = TraceConfig {
            caller_resolution: CallerResolution::Supplied,
            ..compact()
        };
        let (mut rec, buf) = recorder(&config);
        let test_fn = Frame::new("RotoscopeTest", "test_flatten", MethodLevel::Instance, "/t.rb", 1);
        rec.trace(|r| {
            r.record(Event::call_from(Frame::identity("Example", "new"), test_fn.clone()))?;
            r.record(call("Example", "normal_method", "/t.rb"))
        })
        .unwrap();

        assert_eq!(
            lines(&buf)[1..],
            [
                "Example,new,RotoscopeTest,test_flatten",
                "Example,normal_method,<ROOT>,<UNKNOWN>",
            ]
        );
        assert_eq!(rec.depth(), 0);
    }

    #[test]
    fn test_caller_policy_excludes_by_call_site() {
        let config = TraceConfig {
            exclude_patterns: vec!["/excluded.rb".to_string()],
            ..compact()
        };
        let (mut rec, buf) = recorder(&config);
        rec.trace(|r| {
            r.record(call("Outer", "work", "/excluded.rb"))?;
            r.record(call("Inner", "sum", "/inner.rb"))?;
            r.record(ret("Inner", "sum"))?;
            r.record(ret("Outer", "work"))
        })
        .unwrap();

        // Outer#work is called from ROOT (no path) and is kept; Inner#sum is
        // called from a frame in the excluded file.
        assert_eq!(lines(&buf)[1..], ["Outer,work,<ROOT>,<UNKNOWN>"]);
    }

    #[test]
    fn test_suppressed_layer_reparents_children() {
        let config = TraceConfig {
            exclude_patterns: vec!["/b.rb".to_string()],
            exclusion_policy: Some(ExclusionPolicy::Callee),
            ..compact()
        };
        let (mut rec, buf) = recorder(&config);
        rec.trace(|r| {
            r.record(call("A", "a", "/a.rb"))?;
            r.record(call("B", "b", "/b.rb"))?;
            r.record(call("C", "c", "/c.rb"))
        })
        .unwrap();

        assert_eq!(lines(&buf)[1..], ["A,a,<ROOT>,<UNKNOWN>", "C,c,A,a"]);
        assert_eq!(rec.depth(), 3);
    }

    #[test]
    fn test_self_entity_skipped() {
        let (mut rec, buf) = recorder(&compact());
        rec.trace(|r| {
            r.record(call("A", "a", "/a.rb"))?;
            r.record(call(crate::config::RECORDER_ENTITY, "log_call", "/recorder.rs"))?;
            r.record(ret(crate::config::RECORDER_ENTITY, "log_call"))?;
            r.record(call("B", "b", "/b.rb"))
        })
        .unwrap();
        assert_eq!(lines(&buf)[1..], ["A,a,<ROOT>,<UNKNOWN>", "B,b,A,a"]);
    }

    #[test]
    fn test_orphan_return_tolerated() {
        let (mut rec, _buf) = recorder(&compact());
        rec.trace(|r| {
            r.record(call("A", "a", "/a.rb"))?;
            r.record(call("B", "b", "/b.rb"))?;
            r.record(ret("A", "a"))
        })
        .unwrap();
        assert_eq!(rec.depth(), 2);
    }

    #[test]
    fn test_mark_writes_label_and_resets() {
        let (mut rec, buf) = recorder(&compact());
        rec.trace(|r| {
            r.record(call("A", "a", "/a.rb"))?;
            r.mark(Some("Hello"))?;
            assert!(r.is_tracing());
            r.record(call("A", "a", "/a.rb"))
        })
        .unwrap();

        assert_eq!(
            lines(&buf)[1..],
            ["A,a,<ROOT>,<UNKNOWN>", "---,Hello", "A,a,<ROOT>,<UNKNOWN>"]
        );
    }

    #[test]
    fn test_mark_event_uses_label() {
        let (mut rec, buf) = recorder(&compact());
        rec.record(Event::mark("ÅÉÎØÜ åéîøü")).unwrap();
        assert_eq!(lines(&buf)[1], "---,ÅÉÎØÜ åéîøü");
    }

    #[test]
    fn test_mark_default_label() {
        let config = TraceConfig {
            mark_label: "segment".to_string(),
            ..compact()
        };
        let (mut rec, buf) = recorder(&config);
        rec.mark(None).unwrap();
        assert_eq!(lines(&buf)[1], "---,segment");
    }

    #[test]
    fn test_closed_recorder_rejects_writes() {
        let (mut rec, buf) = recorder(&compact());
        rec.trace(|r| {
            r.record(call("A", "a", "/a.rb"))?;
            r.close()?;
            assert!(matches!(r.mark(None), Err(TraceError::IoClosed)));
            assert!(matches!(
                r.record(call("A", "a", "/a.rb")),
                Err(TraceError::IoClosed)
            ));
            Ok(())
        })
        .unwrap();
        assert_eq!(lines(&buf).len(), 2);
        rec.close().unwrap();
    }

    #[test]
    fn test_unique_rows() {
        let config = TraceConfig {
            unique: true,
            ..compact()
        };
        let (mut rec, buf) = recorder(&config);
        rec.trace(|r| {
            for _ in 0..3 {
                r.record(call("Dog", "bark", "/dog.rb"))?;
                r.record(ret("Dog", "bark"))?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(lines(&buf)[1..], ["Dog,bark,<ROOT>,<UNKNOWN>"]);
    }

    #[test]
    fn test_events_from_other_threads_ignored() {
        let (rec, buf) = recorder(&compact());
        let shared = std::sync::Arc::new(std::sync::Mutex::new(rec));

        {
            let shared = shared.clone();
            std::thread::spawn(move || {
                let mut rec = shared.lock().unwrap();
                rec.start_trace();
                rec.record(call("Example", "new", "/t.rb")).unwrap();
            })
            .join()
            .unwrap();
        }

        let mut rec = shared.lock().unwrap();
        rec.record(call("Thread", "join", "/t.rb")).unwrap();
        assert_eq!(lines(&buf)[1..], ["Thread,join,<ROOT>,<UNKNOWN>"]);
    }

    #[test]
    fn test_close_from_other_thread_keeps_tracing() {
        let (mut rec, buf) = recorder(&compact());
        rec.start_trace();
        rec.record(call("Dog", "bark", "/dog.rb")).unwrap();
        let shared = std::sync::Arc::new(std::sync::Mutex::new(rec));

        {
            let shared = shared.clone();
            std::thread::spawn(move || {
                let mut rec = shared.lock().unwrap();
                rec.close().unwrap();
                rec.record(call("Dog", "sit", "/dog.rb")).unwrap();
            })
            .join()
            .unwrap();
        }

        let mut rec = shared.lock().unwrap();
        assert_eq!(rec.state(), SessionState::Tracing);
        assert_eq!(rec.emitted(), 1);

        rec.record(call("Dog", "roll", "/dog.rb")).unwrap();
        assert_eq!(rec.emitted(), 2);
        rec.close().unwrap();
        assert_eq!(rec.state(), SessionState::Closed);
        assert_eq!(
            lines(&buf)[1..],
            ["Dog,bark,<ROOT>,<UNKNOWN>", "Dog,roll,Dog,bark"]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TraceConfig {
            include_patterns: vec![String::new()],
            ..TraceConfig::default()
        };
        let result = Recorder::new(Sink::from_writer(SharedBuffer::default()), &config);
        assert!(matches!(result, Err(TraceError::InvalidConfiguration(_))));
    }
}
