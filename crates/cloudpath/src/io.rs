//! File handles over local mirrors.
//!
//! Readers and writers are plain `std::fs::File`s with cache bookkeeping
//! attached. A writer pushes the mirror back to the remote object when it is
//! closed; dropping it without closing runs the same push before the drop
//! returns.
//!
//! [`CloudStreamReader`] is the raw I/O path: it reads the remote object in
//! ranged chunks and never touches the mirror.

use std::fs::File;
use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use futures::stream::{self, BoxStream, StreamExt};
use rusty_cloudpath_storage::{ObjectLocation, StorageBackend};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::client::Client;
use crate::error::CloudPathError;
use crate::path::CloudPath;

fn closed_handle() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "handle is closed")
}

/// Read handle over a mirror.
pub struct CloudReader {
    file: Option<File>,
    mirror: PathBuf,
    client: Client,
    evict_on_close: bool,
}

impl CloudReader {
    pub(crate) fn new(file: File, mirror: PathBuf, client: Client, evict_on_close: bool) -> Self {
        Self {
            file: Some(file),
            mirror,
            client,
            evict_on_close,
        }
    }

    /// Local mirror being read.
    pub fn local_path(&self) -> &Path {
        &self.mirror
    }

    /// Close the handle, evicting the mirror in `close_on_file` mode.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.file.take().is_some() && self.evict_on_close {
            self.client.inner.remove_mirror(&self.mirror);
        }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(closed_handle)
    }
}

impl Read for CloudReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Seek for CloudReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl Drop for CloudReader {
    fn drop(&mut self) {
        self.release();
    }
}

/// Write handle over a mirror.
///
/// The mirror is dirty from the moment the writer is opened until a push
/// succeeds. Prefer [`CloudWriter::close`], which reports push failures.
pub struct CloudWriter {
    file: Option<File>,
    path: CloudPath,
    original_mtime: Option<SystemTime>,
    force: bool,
}

impl CloudWriter {
    pub(crate) fn new(
        path: CloudPath,
        file: File,
        original_mtime: Option<SystemTime>,
        force: bool,
    ) -> Self {
        Self {
            file: Some(file),
            path,
            original_mtime,
            force,
        }
    }

    /// Path being written.
    pub fn path(&self) -> &CloudPath {
        &self.path
    }

    /// Local mirror being written.
    pub fn local_path(&self) -> &Path {
        self.path.local_cache_path()
    }

    /// Flush, close the mirror and push it to the remote object.
    ///
    /// # Errors
    /// Returns `OverwriteNewerCloud` when the remote changed since the writer
    /// was opened (unless forced), or the connector's error. The mirror stays
    /// dirty in both cases.
    ///
    /// The push runs even when the final flush fails; the first error wins.
    pub async fn close(mut self) -> Result<(), CloudPathError> {
        let flushed: Result<(), CloudPathError> = match self.file.take() {
            Some(mut file) => file
                .flush()
                .map_err(|e| CloudPathError::io(self.path.local_cache_path(), e)),
            None => Ok(()),
        };
        let pushed: Result<(), CloudPathError> = self
            .path
            .client()
            .finish_write(self.path.location(), self.original_mtime, self.force)
            .await;
        flushed.and(pushed)
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(closed_handle)
    }
}

impl Write for CloudWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl Read for CloudWriter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Seek for CloudWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl Drop for CloudWriter {
    fn drop(&mut self) {
        let Some(mut file) = self.file.take() else {
            return;
        };
        if let Err(e) = file.flush() {
            log::warn!("Failed to flush {}: {}", self.path.local_cache_path().display(), e);
        }
        drop(file);

        let client: &Client = self.path.client();
        let pushed: Result<(), CloudPathError> = block_on_from_sync(
            self.path.local_cache_path(),
            client.finish_write(self.path.location(), self.original_mtime, self.force),
        )
        .and_then(|pushed: Result<(), CloudPathError>| pushed);

        if let Err(e) = pushed {
            log::warn!(
                "Failed to push {} after its writer was dropped: {}",
                self.path.as_uri(),
                e
            );
        }
    }
}

/// Drive a future to completion from synchronous code.
///
/// On a multi-threaded runtime the calling worker blocks in place. On a
/// current-thread runtime, or outside any runtime, a scoped helper thread runs
/// the future on its own runtime and is joined before this returns.
fn block_on_from_sync<F>(mirror: &Path, future: F) -> Result<F::Output, CloudPathError>
where
    F: Future + Send,
    F::Output: Send,
{
    if let Ok(handle) = Handle::try_current() {
        if handle.runtime_flavor() == RuntimeFlavor::MultiThread {
            return Ok(tokio::task::block_in_place(|| handle.block_on(future)));
        }
    }

    std::thread::scope(|scope| {
        scope
            .spawn(|| {
                let runtime: tokio::runtime::Runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| CloudPathError::io(mirror, e))?;
                Ok(runtime.block_on(future))
            })
            .join()
            .unwrap_or_else(|_| {
                Err(CloudPathError::Io {
                    path: mirror.display().to_string(),
                    message: "push thread panicked".into(),
                })
            })
    })
}

/// Default chunk size of streaming reads.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Builds a streaming reader for an object of a known size.
pub type StreamReaderFactory =
    Arc<dyn Fn(Arc<dyn StorageBackend>, ObjectLocation, u64) -> CloudStreamReader + Send + Sync>;

/// Seekable reader that pulls an object straight from the store in ranged
/// requests, bypassing the local mirror.
pub struct CloudStreamReader {
    backend: Arc<dyn StorageBackend>,
    location: ObjectLocation,
    size: u64,
    position: u64,
    buffer_size: usize,
    buffer: Vec<u8>,
    buffer_start: u64,
}

impl CloudStreamReader {
    /// Reader over `size` bytes of `location`, fetched `buffer_size` bytes at a time.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        location: ObjectLocation,
        size: u64,
        buffer_size: usize,
    ) -> Self {
        Self {
            backend,
            location,
            size,
            position: 0,
            buffer_size: buffer_size.max(1),
            buffer: Vec::new(),
            buffer_start: 0,
        }
    }

    /// Factory producing readers with the given chunk size.
    pub fn factory(buffer_size: usize) -> StreamReaderFactory {
        Arc::new(
            move |backend: Arc<dyn StorageBackend>, location: ObjectLocation, size: u64| {
                CloudStreamReader::new(backend, location, size, buffer_size)
            },
        )
    }

    /// Object size captured when the reader was opened.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current read offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the read offset. Offsets past the end are allowed and read nothing.
    ///
    /// # Errors
    /// Returns `Io` when the target offset would be negative.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, CloudPathError> {
        let target: Option<u64> = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
        };
        self.position = target.ok_or_else(|| CloudPathError::Io {
            path: self.location.to_string(),
            message: "seek before the start of the object".into(),
        })?;
        Ok(self.position)
    }

    /// Read up to `buf.len()` bytes at the current offset.
    ///
    /// # Returns
    /// Number of bytes copied; zero at end of object.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, CloudPathError> {
        if buf.is_empty() || self.position >= self.size {
            return Ok(0);
        }

        let buffer_end: u64 = self.buffer_start + self.buffer.len() as u64;
        if self.position < self.buffer_start || self.position >= buffer_end {
            let want: u64 = self.buffer_size.max(buf.len()) as u64;
            let end: u64 = (self.position + want).min(self.size) - 1;
            self.buffer = self
                .backend
                .get_range(&self.location, self.position, end)
                .await?;
            self.buffer_start = self.position;
            if self.buffer.is_empty() {
                // The object shrank since the reader was opened.
                return Ok(0);
            }
        }

        let offset: usize = (self.position - self.buffer_start) as usize;
        let available: &[u8] = &self.buffer[offset..];
        let count: usize = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.position += count as u64;
        Ok(count)
    }

    /// Read from the current offset to the end of the object.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, CloudPathError> {
        let mut data: Vec<u8> = Vec::with_capacity(self.size.saturating_sub(self.position) as usize);
        let mut chunk: Vec<u8> = vec![0; self.buffer_size];
        loop {
            let count: usize = self.read(&mut chunk).await?;
            if count == 0 {
                return Ok(data);
            }
            data.extend_from_slice(&chunk[..count]);
        }
    }

    /// Turn the reader into a stream of chunks from the current offset.
    pub fn into_chunks(self) -> BoxStream<'static, Result<Vec<u8>, CloudPathError>> {
        stream::try_unfold(self, |mut reader: CloudStreamReader| async move {
            let mut chunk: Vec<u8> = vec![0; reader.buffer_size];
            let count: usize = reader.read(&mut chunk).await?;
            if count == 0 {
                return Ok::<_, CloudPathError>(None);
            }
            chunk.truncate(count);
            Ok(Some((chunk, reader)))
        })
        .boxed()
    }
}
