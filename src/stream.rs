//! Streaming sources and targets.
//!
//! A [`Source`] wraps a caller-owned reader, a [`Target`] a caller-owned
//! writer. Both register their state in a process-wide table keyed by a
//! monotonically increasing id. The engine drives them through the free
//! callback functions ([`source_read`], [`source_seek`], [`target_write`],
//! [`target_end`]), which look the adapter up under a read lock, so an
//! adapter stays alive for as long as its id is registered.
//!
//! The callbacks follow the descriptor convention: a byte count (or new
//! offset) on success and `-1` on failure.

use crate::engine;
use crate::error::{Error, Result};
use crate::logging::{log_debug, log_warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex, RwLock};

/// Bytes cached from the start of every source for format sniffing.
pub const HEADER_SIZE: usize = 1024;

/// Failure sentinel returned by the callbacks.
pub const CALLBACK_ERROR: i64 = -1;

/// Origin of a [`source_seek`] offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

enum Input {
    OneShot(Box<dyn Read + Send>),
    Seekable(Box<dyn ReadSeek>),
}

struct SourceState {
    input: Input,
    header: Vec<u8>,
    /// Logical read position.
    position: u64,
    /// Set once a seek has positioned the underlying reader directly.
    bypass_header: bool,
}

impl SourceState {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.bypass_header && (self.position as usize) < self.header.len() {
            let cached = &self.header[self.position as usize..];
            let n = cached.len().min(buf.len());
            buf[..n].copy_from_slice(&cached[..n]);
            self.position += n as u64;
            return Ok(n);
        }
        let n = match &mut self.input {
            Input::OneShot(r) => r.read(buf)?,
            Input::Seekable(r) => r.read(buf)?,
        };
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        let Input::Seekable(r) = &mut self.input else {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "source is not seekable"));
        };
        let target = match whence {
            Whence::Start => SeekFrom::Start(
                u64::try_from(offset).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative offset"))?,
            ),
            Whence::Current => {
                let absolute = self.position as i64 + offset;
                SeekFrom::Start(
                    u64::try_from(absolute)
                        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?,
                )
            }
            Whence::End => SeekFrom::End(offset),
        };
        self.position = r.seek(target)?;
        self.bypass_header = true;
        Ok(self.position)
    }
}

struct TargetState {
    writer: Box<dyn Write + Send>,
    written: u64,
    finished: bool,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

static SOURCES: LazyLock<RwLock<HashMap<u64, Mutex<SourceState>>>> = LazyLock::new(|| RwLock::new(HashMap::new()));
static TARGETS: LazyLock<RwLock<HashMap<u64, Mutex<TargetState>>>> = LazyLock::new(|| RwLock::new(HashMap::new()));

fn with_source<R>(id: u64, f: impl FnOnce(&mut SourceState) -> io::Result<R>) -> io::Result<R> {
    let table = SOURCES.read().unwrap_or_else(|e| e.into_inner());
    let entry = table
        .get(&id)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no source #{id}")))?;
    let mut state = entry.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut state)
}

fn with_target<R>(id: u64, f: impl FnOnce(&mut TargetState) -> io::Result<R>) -> io::Result<R> {
    let table = TARGETS.read().unwrap_or_else(|e| e.into_inner());
    let entry = table
        .get(&id)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no target #{id}")))?;
    let mut state = entry.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut state)
}

/// Pull up to `buf.len()` bytes from source `id`.
///
/// Returns the number of bytes read, `0` at end of stream, or `-1`.
pub fn source_read(id: u64, buf: &mut [u8]) -> i64 {
    match with_source(id, |s| s.read(buf)) {
        Ok(n) => n as i64,
        Err(e) => {
            log_debug!("source #{id}: read failed: {e}");
            CALLBACK_ERROR
        }
    }
}

/// Reposition source `id`. Returns the new offset, or `-1` when the source
/// cannot seek.
pub fn source_seek(id: u64, offset: i64, whence: Whence) -> i64 {
    match with_source(id, |s| s.seek(offset, whence)) {
        Ok(position) => position as i64,
        Err(e) => {
            log_debug!("source #{id}: seek failed: {e}");
            CALLBACK_ERROR
        }
    }
}

/// Push `buf` into target `id`. Returns the number of bytes taken, or `-1`.
pub fn target_write(id: u64, buf: &[u8]) -> i64 {
    let written = with_target(id, |t| {
        if t.finished {
            return Err(io::Error::other("target already ended"));
        }
        let n = t.writer.write(buf)?;
        t.written += n as u64;
        Ok(n)
    });
    match written {
        Ok(n) => n as i64,
        Err(e) => {
            log_debug!("target #{id}: write failed: {e}");
            CALLBACK_ERROR
        }
    }
}

/// Flush and finish target `id`. Returns `0`, or `-1` on failure.
pub fn target_end(id: u64) -> i64 {
    match with_target(id, |t| {
        t.writer.flush()?;
        t.finished = true;
        Ok(())
    }) {
        Ok(()) => 0,
        Err(e) => {
            log_debug!("target #{id}: end failed: {e}");
            CALLBACK_ERROR
        }
    }
}

/// A pull-based byte source.
pub struct Source {
    id: u64,
    header: Vec<u8>,
    /// Counted in [`MemoryStats::files`](crate::runtime::MemoryStats::files).
    file_backed: bool,
    closed: bool,
}

impl Source {
    fn register(mut input: Input, file_backed: bool) -> Result<Source> {
        let mut header = Vec::with_capacity(HEADER_SIZE);
        {
            let reader: &mut dyn Read = match &mut input {
                Input::OneShot(r) => r,
                Input::Seekable(r) => r,
            };
            reader.take(HEADER_SIZE as u64).read_to_end(&mut header)?;
        }
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let state = SourceState {
            input,
            header: header.clone(),
            position: 0,
            bypass_header: false,
        };
        SOURCES
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Mutex::new(state));
        if file_backed {
            engine::file_opened();
        }
        log_debug!("source #{id}: opened, {} header byte(s) cached", header.len());
        Ok(Source {
            id,
            header,
            file_backed,
            closed: false,
        })
    }

    /// Wrap a reader that can only be read once, front to back.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Result<Source> {
        Self::register(Input::OneShot(Box::new(reader)), false)
    }

    /// Wrap a reader that can also seek.
    pub fn from_seekable(reader: impl Read + Seek + Send + 'static) -> Result<Source> {
        Self::register(Input::Seekable(Box::new(reader)), false)
    }

    /// Read from an already open file.
    pub fn from_file(file: File) -> Result<Source> {
        Self::register(Input::Seekable(Box::new(file)), true)
    }

    pub fn from_path(path: &Path) -> Result<Source> {
        Self::from_file(File::open(path)?)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Up to [`HEADER_SIZE`] bytes from the start of the stream.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// See [`source_read`].
    pub fn read(&self, buf: &mut [u8]) -> i64 {
        if self.closed {
            return CALLBACK_ERROR;
        }
        source_read(self.id, buf)
    }

    /// See [`source_seek`].
    pub fn seek(&self, offset: i64, whence: Whence) -> i64 {
        if self.closed {
            return CALLBACK_ERROR;
        }
        source_seek(self.id, offset, whence)
    }

    /// Drain the stream from the current position through the read callback.
    pub(crate) fn read_to_end(&self) -> Result<Vec<u8>> {
        if self.closed {
            return Err(Error::Closed);
        }
        let mut out = Vec::new();
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            match self.read(&mut chunk) {
                0 => return Ok(out),
                n if n > 0 => out.extend_from_slice(&chunk[..n as usize]),
                _ => {
                    return Err(Error::Io(io::Error::other(format!("source #{}: read failed", self.id))));
                }
            }
        }
    }

    /// Unregister and release the reader. Calling this again does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        SOURCES
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
        if self.file_backed {
            engine::file_closed();
        }
        log_debug!("source #{}: closed", self.id);
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("file_backed", &self.file_backed)
            .field("closed", &self.closed)
            .finish()
    }
}

/// A push-based byte sink.
pub struct Target {
    id: u64,
    file_backed: bool,
    closed: bool,
}

impl Target {
    fn register(writer: Box<dyn Write + Send>, file_backed: bool) -> Target {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        TARGETS.write().unwrap_or_else(|e| e.into_inner()).insert(
            id,
            Mutex::new(TargetState {
                writer,
                written: 0,
                finished: false,
            }),
        );
        if file_backed {
            engine::file_opened();
        }
        log_debug!("target #{id}: opened");
        Target {
            id,
            file_backed,
            closed: false,
        }
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Target {
        Self::register(Box::new(writer), false)
    }

    /// Write into an already open file.
    pub fn from_file(file: File) -> Target {
        Self::register(Box::new(file), true)
    }

    /// Create (or truncate) the file at `path`.
    pub fn from_path(path: &Path) -> Result<Target> {
        Ok(Self::from_file(File::create(path)?))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Total bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        with_target(self.id, |t| Ok(t.written)).unwrap_or(0)
    }

    /// See [`target_write`].
    pub fn write(&self, buf: &[u8]) -> i64 {
        if self.closed {
            return CALLBACK_ERROR;
        }
        target_write(self.id, buf)
    }

    /// See [`target_end`].
    pub fn end(&self) -> i64 {
        if self.closed {
            return CALLBACK_ERROR;
        }
        target_end(self.id)
    }

    /// Write all of `bytes` and finish the stream.
    pub(crate) fn push_all(&self, mut bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        while !bytes.is_empty() {
            match self.write(bytes) {
                n if n > 0 => bytes = &bytes[n as usize..],
                0 => return Err(Error::Io(io::Error::from(io::ErrorKind::WriteZero))),
                _ => {
                    return Err(Error::Io(io::Error::other(format!("target #{}: write failed", self.id))));
                }
            }
        }
        if self.end() < 0 {
            return Err(Error::Io(io::Error::other(format!("target #{}: end failed", self.id))));
        }
        Ok(())
    }

    /// Flush, unregister and release the writer. Calling this again does
    /// nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let state = TARGETS
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
        if let Some(state) = state {
            let mut state = state.into_inner().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = state.writer.flush() {
                log_warn!("target #{}: flush on close failed: {e}", self.id);
            }
        }
        if self.file_backed {
            engine::file_closed();
        }
        log_debug!("target #{}: closed", self.id);
    }
}

impl Drop for Target {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id)
            .field("file_backed", &self.file_backed)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Registered sources and targets, for leak reports.
pub(crate) fn open_streams() -> (usize, usize) {
    let sources = SOURCES.read().unwrap_or_else(|e| e.into_inner()).len();
    let targets = TARGETS.read().unwrap_or_else(|e| e.into_inner()).len();
    (sources, targets)
}
