//! Recording sessions: output sinks and ownership checks
//!
//! A session belongs to the process and thread that created it. Writes from
//! anywhere else are dropped. A forked child holds a copy of the parent's
//! buffered sink; flushing that copy would duplicate or corrupt bytes the
//! parent still owns, so in a foreign process closing a session discards
//! the buffer and only releases the descriptor.

use crate::error::{Result, TraceError};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::thread::{self, ThreadId};

/// Process and thread that created a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOwner {
    pid: i32,
    thread: ThreadId,
}

impl SessionOwner {
    /// Capture the current process and thread
    pub fn capture() -> Self {
        Self {
            pid: nix::unistd::getpid().as_raw(),
            thread: thread::current().id(),
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn in_owning_process(&self) -> bool {
        nix::unistd::getpid().as_raw() == self.pid
    }

    pub fn on_owning_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// True when called from the creating process and thread
    pub fn is_current(&self) -> bool {
        self.in_owning_process() && self.on_owning_thread()
    }

    #[cfg(test)]
    pub(crate) fn with_pid(pid: i32) -> Self {
        Self {
            pid,
            thread: thread::current().id(),
        }
    }
}

/// Destination for serialized rows
pub enum Sink {
    /// Buffered plain file
    File(BufWriter<File>),
    /// Gzip-compressed file
    Gzip(GzEncoder<File>),
    /// Caller-supplied writer; dropped without an explicit flush when discarded
    Writer(Box<dyn Write + Send>),
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sink::File(_) => f.write_str("Sink::File"),
            Sink::Gzip(_) => f.write_str("Sink::Gzip"),
            Sink::Writer(_) => f.write_str("Sink::Writer"),
        }
    }
}

impl Sink {
    /// Create a file sink; paths ending in `.gz` are gzip-compressed
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            Ok(Sink::Gzip(GzEncoder::new(file, Compression::default())))
        } else {
            Ok(Sink::File(BufWriter::new(file)))
        }
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Sink::Writer(Box::new(writer))
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Sink::File(w) => w,
            Sink::Gzip(w) => w,
            Sink::Writer(w) => w,
        }
    }

    /// Write `line` followed by a newline
    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let w = self.writer();
        w.write_all(line.as_bytes())?;
        w.write_all(b"\n")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer().flush()
    }

    /// Flush everything and release the destination
    pub fn finish(self) -> std::io::Result<()> {
        match self {
            Sink::File(mut w) => w.flush(),
            Sink::Gzip(w) => {
                let mut file = w.finish()?;
                file.flush()
            }
            Sink::Writer(mut w) => w.flush(),
        }
    }

    /// Release the destination without flushing buffered bytes
    pub fn discard(self) {
        match self {
            Sink::File(w) => {
                let (file, _unflushed) = w.into_parts();
                drop(file);
            }
            Sink::Gzip(w) => {
                let fd = w.get_ref().as_raw_fd();
                // The encoder would write its trailer on drop.
                std::mem::forget(w);
                // SAFETY: `fd` belongs to the forgotten encoder's file, which is never used again.
                unsafe {
                    libc::close(fd);
                }
            }
            Sink::Writer(w) => drop(w),
        }
    }
}

/// An owned sink bound to its creating process and thread
#[derive(Debug)]
pub struct Session {
    sink: Option<Sink>,
    owner: SessionOwner,
}

impl Session {
    pub fn new(sink: Sink) -> Self {
        Self {
            sink: Some(sink),
            owner: SessionOwner::capture(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_owner(sink: Sink, owner: SessionOwner) -> Self {
        Self {
            sink: Some(sink),
            owner,
        }
    }

    pub fn owner(&self) -> SessionOwner {
        self.owner
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// May the current thread write through this session?
    pub fn is_current(&self) -> bool {
        self.owner.is_current()
    }

    /// Append one row. A no-op outside the owning process and thread.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(TraceError::IoClosed)?;
        if !self.owner.is_current() {
            return Ok(());
        }
        sink.write_line(line)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(TraceError::IoClosed)?;
        if self.owner.is_current() {
            sink.flush()?;
        }
        Ok(())
    }

    /// Close the sink. Idempotent.
    ///
    /// From another thread of the owning process this does nothing. From a
    /// forked child the buffered bytes are discarded and the descriptor is
    /// released.
    pub fn close(&mut self) -> Result<()> {
        if !self.owner.in_owning_process() {
            if let Some(sink) = self.sink.take() {
                tracing::debug!(owner = self.owner.pid(), "discarding sink inherited across fork");
                sink.discard();
            }
            return Ok(());
        }

        if !self.owner.on_owning_thread() {
            tracing::warn!("ignoring close from a thread that does not own the session");
            return Ok(());
        }

        match self.sink.take() {
            Some(sink) => sink.finish().map_err(TraceError::from),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(sink) = self.sink.take() else {
            return;
        };

        if self.owner.in_owning_process() {
            if let Err(e) = sink.finish() {
                tracing::debug!("failed to finish sink on drop: {}", e);
            }
        } else {
            sink.discard();
        }
    }
}
