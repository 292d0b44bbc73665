//! Receivers decide where a data stream's bytes end up.
//!
//! The default [`InMemoryReceiver`] buffers the payload the first time its
//! bytes are asked for. Transports that want the bytes elsewhere attach their
//! own receiver, e.g. a [`FileReceiver`] that writes straight to disk.

use crate::error::{DataStreamError, Result};
use crate::stream::handle::{DataStream, Producer};
use bytes::Bytes;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Cap on the up-front allocation taken from a declared length (64MB)
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Destination of a data stream
pub trait DataStreamReceiver: Send + Sync {
    /// Be the target of a transmission of `stream`.
    fn accept(&self, stream: &DataStream) -> Result<()>;

    /// Hand the received bytes to `reader`.
    fn read(&self, reader: &mut dyn FnMut(&mut dyn Read) -> Result<()>) -> Result<()>;

    /// Persist the received bytes to `path`.
    fn save_to(&self, path: &Path) -> Result<()>;
}

// =============================================================================
// In-memory receiver
// =============================================================================

/// Buffers the payload in memory.
///
/// Bound to the producer of the stream it came from. The first `bytes`,
/// `read` or `save_to` runs the producer; later calls reuse the buffer.
pub struct InMemoryReceiver {
    id: Uuid,
    length: u64,
    producer: Producer,
    buffer: Mutex<Option<Bytes>>,
}

impl InMemoryReceiver {
    /// Receiver bound to `stream`'s producer. Nothing runs until the bytes are asked for.
    pub fn for_stream(stream: &DataStream) -> Self {
        Self::new(stream.id(), stream.length(), stream.producer().clone())
    }

    pub(crate) fn new(id: Uuid, length: u64, producer: Producer) -> Self {
        Self {
            id,
            length,
            producer,
            buffer: Mutex::new(None),
        }
    }

    /// Whether the payload has been buffered yet.
    pub fn is_materialized(&self) -> bool {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The payload bytes, produced on first call.
    pub fn bytes(&self) -> Result<Bytes> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bytes) = buffer.as_ref() {
            return Ok(bytes.clone());
        }

        let bytes = produce(self.id, self.length, &self.producer)?;
        *buffer = Some(bytes.clone());
        Ok(bytes)
    }
}

fn produce(id: Uuid, length: u64, producer: &Producer) -> Result<Bytes> {
    if matches!(producer, Producer::Remote) {
        return Err(DataStreamError::MissingProducer { id });
    }
    let mut out = Vec::with_capacity(length.min(MAX_PREALLOC) as usize);
    producer.write_to(id, &mut out)?;
    tracing::debug!(%id, bytes = out.len(), "Buffered data stream in memory");
    Ok(Bytes::from(out))
}

impl DataStreamReceiver for InMemoryReceiver {
    fn accept(&self, stream: &DataStream) -> Result<()> {
        let bytes = produce(stream.id(), stream.length(), stream.producer())?;
        *self.buffer.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
        Ok(())
    }

    fn read(&self, reader: &mut dyn FnMut(&mut dyn Read) -> Result<()>) -> Result<()> {
        let bytes = self.bytes()?;
        reader(&mut Cursor::new(bytes.as_ref()))
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.bytes()?)?;
        Ok(())
    }
}

// =============================================================================
// File receiver
// =============================================================================

/// Writes the payload directly to a file.
///
/// Bytes go to a temporary sibling first and are renamed into place once
/// the transmission completes; a failed transmission leaves `path` untouched.
#[derive(Debug, Clone)]
pub struct FileReceiver {
    path: PathBuf,
}

impl FileReceiver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".datastream.tmp");
        self.path.with_file_name(name)
    }
}

impl DataStreamReceiver for FileReceiver {
    fn accept(&self, stream: &DataStream) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path();
        let guard = TempFileGuard::new(&temp_path);

        let mut writer = BufWriter::new(File::create(&temp_path)?);
        stream.transmit(&mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        guard.defuse();

        tracing::debug!(
            id = %stream.id(),
            path = %self.path.display(),
            "Received data stream to file"
        );
        Ok(())
    }

    fn read(&self, reader: &mut dyn FnMut(&mut dyn Read) -> Result<()>) -> Result<()> {
        let mut file = BufReader::new(File::open(&self.path)?);
        reader(&mut file)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if path == self.path {
            return Ok(());
        }
        fs::copy(&self.path, path)?;
        Ok(())
    }
}

/// Removes a temporary file on drop unless defused
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn defuse(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    "Failed to remove temporary file {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}
