//! Deferred writers: how a data stream produces its bytes.
//!
//! A writer is stored when the handle is created and only runs when the
//! transport transmits the payload.

use crate::error::Result;
use crate::stream::copy::{AdaptiveCopy, ProgressFn};
use crate::stream::encoding::TextEncoding;
use bytes::Bytes;
use std::io::{Read, Seek, Write};
use std::sync::{Mutex, PoisonError};

/// Produces a payload into a sink.
pub trait PayloadWriter: Send + Sync {
    fn write_to(&self, sink: &mut dyn Write) -> Result<()>;
}

impl<F> PayloadWriter for F
where
    F: Fn(&mut dyn Write) -> Result<()> + Send + Sync,
{
    fn write_to(&self, sink: &mut dyn Write) -> Result<()> {
        self(sink)
    }
}

/// Writes a fixed byte buffer verbatim
#[derive(Debug, Clone)]
pub struct BytesWriter {
    data: Bytes,
}

impl BytesWriter {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl PayloadWriter for BytesWriter {
    fn write_to(&self, sink: &mut dyn Write) -> Result<()> {
        sink.write_all(&self.data)?;
        Ok(())
    }
}

/// Encodes text on demand
#[derive(Debug, Clone)]
pub struct TextWriter {
    text: String,
    encoding: TextEncoding,
}

impl TextWriter {
    pub fn new(text: impl Into<String>, encoding: TextEncoding) -> Self {
        Self {
            text: text.into(),
            encoding,
        }
    }

    pub fn len(&self) -> u64 {
        self.encoding.byte_count(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl PayloadWriter for TextWriter {
    fn write_to(&self, sink: &mut dyn Write) -> Result<()> {
        self.encoding.write_to(&self.text, sink)
    }
}

/// Copies a seekable source with the adaptive copy engine
pub struct StreamWriter<R> {
    source: Mutex<R>,
    total_len: u64,
    engine: AdaptiveCopy,
    on_progress: ProgressFn,
}

impl<R> StreamWriter<R>
where
    R: Read + Seek + Send,
{
    pub fn new(source: R, total_len: u64, engine: AdaptiveCopy, on_progress: ProgressFn) -> Self {
        Self {
            source: Mutex::new(source),
            total_len,
            engine,
            on_progress,
        }
    }

    pub fn len(&self) -> u64 {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }
}

impl<R> PayloadWriter for StreamWriter<R>
where
    R: Read + Seek + Send,
{
    fn write_to(&self, sink: &mut dyn Write) -> Result<()> {
        // A panic mid-copy leaves the source position arbitrary; copy seeks to start anyway.
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        self.engine
            .copy(&mut *source, sink, self.total_len, &*self.on_progress)?;
        Ok(())
    }
}
