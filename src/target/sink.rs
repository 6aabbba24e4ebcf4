//! Output sinks for targets.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

use super::BoxedWriter;

/// A cloneable in-memory byte buffer.
///
/// Every clone appends to the same storage, so one handle can be given to a
/// target while the test keeps another to inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        // A panicking writer cannot leave the Vec in a torn state.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    /// Buffer contents, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.append(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where a target sends command output.
#[derive(Debug, Clone, Default)]
pub enum OutputSink {
    /// The current process's standard output.
    #[default]
    Stdout,
    /// The current process's standard error.
    Stderr,
    /// An in-memory buffer.
    Buffer(SharedBuffer),
    /// Dropped.
    Discard,
}

impl OutputSink {
    /// A fresh writer for this sink.
    pub fn writer(&self) -> BoxedWriter {
        match self {
            OutputSink::Stdout => Box::new(tokio::io::stdout()),
            OutputSink::Stderr => Box::new(tokio::io::stderr()),
            OutputSink::Buffer(buffer) => Box::new(buffer.clone()),
            OutputSink::Discard => Box::new(tokio::io::sink()),
        }
    }
}

impl From<SharedBuffer> for OutputSink {
    fn from(buffer: SharedBuffer) -> Self {
        OutputSink::Buffer(buffer)
    }
}
