//! The data stream handle.
//!
//! A `DataStream` names a payload (`id`), declares its size (`length`) and
//! knows how to produce it later. Nothing is read or written until the
//! transport calls [`DataStream::transmit`] or [`DataStream::deliver`].
//!
//! # Lifecycle
//!
//! ```text
//! producer                         consumer / transport
//! --------                         --------------------
//! DataStream::from_*  --envelope-->  DataStream::remote(id, length)
//!                                    attach_receiver(custom)   (optional)
//! deliver() / transmit(sink) <------ receiver()
//! ```

use crate::config::CopyConfig;
use crate::error::{DataStreamError, Result};
use crate::stream::copy::{no_progress, AdaptiveCopy, ProgressFn};
use crate::stream::encoding::TextEncoding;
use crate::stream::envelope::DataStreamRef;
use crate::stream::receiver::{DataStreamReceiver, InMemoryReceiver};
use crate::stream::writer::{BytesWriter, PayloadWriter, StreamWriter, TextWriter};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use uuid::Uuid;

/// Where a data stream's bytes come from
#[derive(Clone)]
pub enum Producer {
    /// Created in this process; the writer produces the bytes
    Local(Arc<dyn PayloadWriter>),
    /// Rebuilt from an envelope; the bytes live elsewhere
    Remote,
}

impl Producer {
    /// Run the writer, or fail with `MissingProducer` for a remote reference.
    pub(crate) fn write_to(&self, id: Uuid, sink: &mut dyn Write) -> Result<()> {
        match self {
            Producer::Local(writer) => writer.write_to(sink),
            Producer::Remote => Err(DataStreamError::MissingProducer { id }),
        }
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Producer::Local(_) => f.write_str("Local"),
            Producer::Remote => f.write_str("Remote"),
        }
    }
}

/// Receiver state of a data stream.
///
/// An unattached stream hands out a fresh [`InMemoryReceiver`] on every
/// [`DataStream::receiver`] call; nothing is memoized on the handle. Attach
/// before resolving if the bytes should land somewhere else.
#[derive(Clone, Default)]
pub enum ReceiverSlot {
    #[default]
    Unattached,
    Attached(Arc<dyn DataStreamReceiver>),
}

impl fmt::Debug for ReceiverSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverSlot::Unattached => f.write_str("Unattached"),
            ReceiverSlot::Attached(_) => f.write_str("Attached"),
        }
    }
}

/// Handle to a lazily produced payload of known length.
///
/// Equality and hashing use the id only. Serializes as its
/// [`DataStreamRef`]; deserializing yields a remote reference.
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "DataStreamRef", try_from = "DataStreamRef")]
pub struct DataStream {
    id: Uuid,
    length: u64,
    producer: Producer,
    receiver: ReceiverSlot,
}

impl DataStream {
    /// Wrap a writer that will produce `length` bytes.
    pub fn new(length: u64, writer: impl PayloadWriter + 'static) -> Self {
        Self::with_producer(Uuid::new_v4(), length, Producer::Local(Arc::new(writer)))
    }

    /// Reference to a payload owned by another process.
    ///
    /// Transmitting it fails with [`DataStreamError::MissingProducer`].
    pub fn remote(id: Uuid, length: u64) -> Self {
        Self::with_producer(id, length, Producer::Remote)
    }

    fn with_producer(id: Uuid, length: u64, producer: Producer) -> Self {
        Self {
            id,
            length,
            producer,
            receiver: ReceiverSlot::Unattached,
        }
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let writer = BytesWriter::new(data);
        Self::new(writer.len(), writer)
    }

    /// UTF-8 text, no BOM.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_text_with_encoding(text, TextEncoding::Utf8)
    }

    /// Text in the given encoding. Unencodable characters fail at transmit time.
    pub fn from_text_with_encoding(text: impl Into<String>, encoding: TextEncoding) -> Self {
        let writer = TextWriter::new(text, encoding);
        Self::new(writer.len(), writer)
    }

    pub fn from_stream<R>(source: R) -> Result<Self>
    where
        R: Read + Seek + Send + 'static,
    {
        Self::from_stream_with_progress(source, no_progress())
    }

    pub fn from_stream_with_progress<R>(source: R, on_progress: ProgressFn) -> Result<Self>
    where
        R: Read + Seek + Send + 'static,
    {
        Self::from_stream_with_config(source, on_progress, &CopyConfig::default())
    }

    /// Stream a seekable source with custom buffer bounds.
    ///
    /// The length is measured once here by seeking to the end; the copy
    /// later rewinds to the start. Invalid bounds fail with
    /// [`DataStreamError::Config`] before the source is touched.
    pub fn from_stream_with_config<R>(
        mut source: R,
        on_progress: ProgressFn,
        config: &CopyConfig,
    ) -> Result<Self>
    where
        R: Read + Seek + Send + 'static,
    {
        let engine = AdaptiveCopy::new(*config)?;
        let length = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;
        Ok(Self::from_source(source, length, on_progress, engine))
    }

    /// Stream an open file; the length comes from its metadata.
    pub fn from_file(file: File, on_progress: ProgressFn) -> Result<Self> {
        Self::from_file_with_config(file, on_progress, &CopyConfig::default())
    }

    /// [`DataStream::from_file`] with custom buffer bounds.
    pub fn from_file_with_config(
        file: File,
        on_progress: ProgressFn,
        config: &CopyConfig,
    ) -> Result<Self> {
        let engine = AdaptiveCopy::new(*config)?;
        let length = file.metadata()?.len();
        Ok(Self::from_source(file, length, on_progress, engine))
    }

    fn from_source<R>(source: R, length: u64, on_progress: ProgressFn, engine: AdaptiveCopy) -> Self
    where
        R: Read + Seek + Send + 'static,
    {
        let writer = StreamWriter::new(source, length, engine, on_progress);
        Self::new(length, writer)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Declared byte count. Not checked against what the writer produces.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.producer, Producer::Remote)
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn receiver_slot(&self) -> &ReceiverSlot {
        &self.receiver
    }

    pub fn envelope(&self) -> DataStreamRef {
        DataStreamRef::from(self)
    }

    /// The attached receiver, or a new in-memory one bound to this stream's producer.
    pub fn receiver(&self) -> Arc<dyn DataStreamReceiver> {
        match &self.receiver {
            ReceiverSlot::Attached(receiver) => receiver.clone(),
            ReceiverSlot::Unattached => Arc::new(InMemoryReceiver::for_stream(self)),
        }
    }

    /// Route future deliveries to `receiver`. Last attachment wins.
    ///
    /// A receiver obtained from [`DataStream::receiver`] before this call is
    /// not updated.
    pub fn attach_receiver(&mut self, receiver: Arc<dyn DataStreamReceiver>) {
        if matches!(self.receiver, ReceiverSlot::Attached(_)) {
            tracing::debug!(id = %self.id, "Replacing attached receiver");
        }
        self.receiver = ReceiverSlot::Attached(receiver);
    }

    /// Write the payload into `sink`. Blocks for the whole copy.
    pub fn transmit(&self, sink: &mut dyn Write) -> Result<()> {
        tracing::debug!(id = %self.id, length = self.length, "Transmitting data stream");
        self.producer.write_to(self.id, sink)
    }

    /// Transmit into the resolved receiver and return it.
    pub fn deliver(&self) -> Result<Arc<dyn DataStreamReceiver>> {
        let receiver = self.receiver();
        receiver.accept(self)?;
        Ok(receiver)
    }

    /// [`DataStream::transmit`] on the blocking pool. Returns the sink when done.
    pub async fn transmit_async<W>(&self, mut sink: W) -> Result<W>
    where
        W: Write + Send + 'static,
    {
        let stream = self.clone();
        tokio::task::spawn_blocking(move || {
            stream.transmit(&mut sink)?;
            Ok(sink)
        })
        .await
        .map_err(|e| DataStreamError::Task(e.to_string()))?
    }

    /// [`DataStream::deliver`] on the blocking pool.
    pub async fn deliver_async(&self) -> Result<Arc<dyn DataStreamReceiver>> {
        let stream = self.clone();
        tokio::task::spawn_blocking(move || stream.deliver())
            .await
            .map_err(|e| DataStreamError::Task(e.to_string()))?
    }
}

impl fmt::Debug for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStream")
            .field("id", &self.id)
            .field("length", &self.length)
            .field("producer", &self.producer)
            .field("receiver", &self.receiver)
            .finish()
    }
}

impl PartialEq for DataStream {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DataStream {}

impl Hash for DataStream {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::receiver::FileReceiver;
    use std::collections::HashSet;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn transmit_to_vec(stream: &DataStream) -> Vec<u8> {
        let mut sink = Vec::new();
        stream.transmit(&mut sink).unwrap();
        sink
    }

    #[test]
    fn test_from_bytes() {
        let stream = DataStream::from_bytes(b"hello world".to_vec());
        assert_eq!(stream.length(), 11);
        assert!(!stream.is_remote());
        assert_eq!(transmit_to_vec(&stream), b"hello world");
    }

    #[test]
    fn test_from_bytes_empty() {
        let stream = DataStream::from_bytes(Vec::new());
        assert_eq!(stream.length(), 0);
        assert!(transmit_to_vec(&stream).is_empty());
    }

    #[test]
    fn test_from_text_default_is_utf8_without_bom() {
        let stream = DataStream::from_text("naïve");
        assert_eq!(stream.length(), 6);
        assert_eq!(transmit_to_vec(&stream), "naïve".as_bytes());
    }

    #[test]
    fn test_from_text_utf16() {
        let stream = DataStream::from_text_with_encoding("hi", TextEncoding::Utf16Le);
        assert_eq!(stream.length(), 4);
        assert_eq!(transmit_to_vec(&stream), vec![b'h', 0, b'i', 0]);
    }

    #[test]
    fn test_from_text_unencodable_fails_on_transmit() {
        let stream = DataStream::from_text_with_encoding("snowman ☃", TextEncoding::Ascii);
        assert_eq!(stream.length(), 9);

        let mut sink = Vec::new();
        let err = stream.transmit(&mut sink).unwrap_err();
        assert!(matches!(err, DataStreamError::Unencodable { ch: '☃', .. }));
    }

    #[test]
    fn test_from_stream_measures_length_and_reports_progress() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 256) as u8).collect();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let on_progress: ProgressFn = {
            let seen = seen.clone();
            Arc::new(move |p| seen.lock().unwrap().push(p))
        };

        let stream =
            DataStream::from_stream_with_progress(Cursor::new(data.clone()), on_progress).unwrap();
        assert_eq!(stream.length(), 20_000);
        assert_eq!(transmit_to_vec(&stream), data);

        // 8KB buffer over 20000 bytes: 40%, 81%, 100%
        assert_eq!(*seen.lock().unwrap(), vec![40, 81, 100]);
    }

    #[test]
    fn test_from_stream_zero_length() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let on_progress: ProgressFn = {
            let seen = seen.clone();
            Arc::new(move |p| seen.lock().unwrap().push(p))
        };

        let stream = DataStream::from_stream_with_progress(Cursor::new(Vec::new()), on_progress)
            .unwrap();
        assert_eq!(stream.length(), 0);
        assert!(transmit_to_vec(&stream).is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }

    #[test]
    fn test_from_stream_starts_from_beginning() {
        let mut cursor = Cursor::new(b"abcdef".to_vec());
        cursor.set_position(4);

        let stream = DataStream::from_stream(cursor).unwrap();
        assert_eq!(stream.length(), 6);
        assert_eq!(transmit_to_vec(&stream), b"abcdef");
    }

    #[test]
    fn test_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("payload.bin");
        std::fs::write(&path, vec![9u8; 5000]).unwrap();

        let file = File::open(&path).unwrap();
        let stream = DataStream::from_file(file, no_progress()).unwrap();
        assert_eq!(stream.length(), 5000);
        assert_eq!(transmit_to_vec(&stream), vec![9u8; 5000]);
    }

    #[test]
    fn test_from_file_with_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("payload.bin");
        std::fs::write(&path, vec![4u8; 1000]).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let on_progress: ProgressFn = {
            let seen = seen.clone();
            Arc::new(move |p| seen.lock().unwrap().push(p))
        };
        let config = CopyConfig {
            min_buffer_size: 250,
            max_buffer_size: 250,
        };

        let file = File::open(&path).unwrap();
        let stream = DataStream::from_file_with_config(file, on_progress, &config).unwrap();
        assert_eq!(transmit_to_vec(&stream), vec![4u8; 1000]);
        assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 100]);
    }

    #[test]
    fn test_from_stream_rejects_zero_buffer() {
        let config = CopyConfig {
            min_buffer_size: 0,
            max_buffer_size: 262144,
        };
        let err = DataStream::from_stream_with_config(
            Cursor::new(b"hello".to_vec()),
            no_progress(),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, DataStreamError::Config(_)));
    }

    #[test]
    fn test_from_file_rejects_inverted_bounds() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("payload.bin");
        std::fs::write(&path, b"data").unwrap();

        let config = CopyConfig {
            min_buffer_size: 1024,
            max_buffer_size: 16,
        };
        let file = File::open(&path).unwrap();
        let err = DataStream::from_file_with_config(file, no_progress(), &config).unwrap_err();
        assert!(matches!(err, DataStreamError::Config(_)));
    }

    #[test]
    fn test_custom_writer_is_deferred() {
        let calls = Arc::new(AtomicUsize::new(0));
        let writer = {
            let calls = calls.clone();
            move |sink: &mut dyn Write| -> Result<()> {
                calls.fetch_add(1, Ordering::SeqCst);
                sink.write_all(b"lazy")?;
                Ok(())
            }
        };

        let stream = DataStream::new(4, writer);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(transmit_to_vec(&stream), b"lazy");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_length_is_not_verified() {
        let stream = DataStream::new(100, BytesWriter::new(&b"short"[..]));
        assert_eq!(stream.length(), 100);
        assert_eq!(transmit_to_vec(&stream), b"short");
    }

    #[test]
    fn test_equality_uses_id_only() {
        let a = DataStream::from_bytes(b"same".to_vec());
        let b = DataStream::from_bytes(b"same".to_vec());
        assert_ne!(a, b);

        let same_id = DataStream::remote(a.id(), 999);
        assert_eq!(a, same_id);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&same_id));
        assert!(!set.contains(&b));
    }

    #[test]
    fn test_absent_handles() {
        let none_a: Option<DataStream> = None;
        let none_b: Option<DataStream> = None;
        let some = Some(DataStream::from_text("x"));

        assert_eq!(none_a, none_b);
        assert_ne!(none_a, some);
        assert_ne!(some, none_b);
    }

    #[test]
    fn test_remote_transmit_fails() {
        let id = Uuid::new_v4();
        let stream = DataStream::remote(id, 10);
        assert!(stream.is_remote());

        let mut sink = Vec::new();
        let err = stream.transmit(&mut sink).unwrap_err();
        assert!(matches!(err, DataStreamError::MissingProducer { id: missing } if missing == id));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_serde_round_trip_is_equal() {
        let stream = DataStream::from_text("payload");
        let json = serde_json::to_string(&stream).unwrap();
        let restored: DataStream = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, stream);
        assert_eq!(restored.length(), stream.length());
        assert!(restored.is_remote());
    }

    #[test]
    fn test_deserialize_rejects_negative_length() {
        let json = format!(r#"{{"id":"{}","length":-5}}"#, Uuid::new_v4());
        assert!(serde_json::from_str::<DataStream>(&json).is_err());
    }

    #[test]
    fn test_binary_envelope_round_trip_is_equal() {
        let stream = DataStream::from_bytes(vec![1u8; 64]);
        let restored = DataStreamRef::decode_frame(stream.envelope().encode())
            .unwrap()
            .into_stream()
            .unwrap();
        assert_eq!(restored, stream);
        assert_eq!(restored.length(), 64);
    }

    #[test]
    fn test_default_receiver_materializes_bytes() {
        let stream = DataStream::from_text("in memory");
        let receiver = stream.deliver().unwrap();

        let mut out = String::new();
        receiver
            .read(&mut |r| {
                r.read_to_string(&mut out)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(out, "in memory");
    }

    #[test]
    fn test_unattached_receivers_are_independent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let writer = {
            let calls = calls.clone();
            move |sink: &mut dyn Write| -> Result<()> {
                calls.fetch_add(1, Ordering::SeqCst);
                sink.write_all(b"x")?;
                Ok(())
            }
        };
        let stream = DataStream::new(1, writer);

        let first = stream.receiver();
        let second = stream.receiver();
        assert!(!Arc::ptr_eq(&first, &second));

        first.read(&mut |_| Ok(())).unwrap();
        second.read(&mut |_| Ok(())).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_attached_receiver_gets_bytes() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out.txt");

        let mut stream = DataStream::from_text("to disk");
        let receiver = Arc::new(FileReceiver::new(&dest));
        stream.attach_receiver(receiver.clone());

        let resolved = stream.deliver().unwrap();
        let as_dyn: Arc<dyn DataStreamReceiver> = receiver;
        assert!(Arc::ptr_eq(&resolved, &as_dyn));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "to disk");
    }

    #[test]
    fn test_last_attachment_wins() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");

        let mut stream = DataStream::from_bytes(b"abc".to_vec());
        stream.attach_receiver(Arc::new(FileReceiver::new(&first)));
        stream.attach_receiver(Arc::new(FileReceiver::new(&second)));
        stream.deliver().unwrap();

        assert!(!first.exists());
        assert_eq!(std::fs::read(&second).unwrap(), b"abc");
    }

    #[test]
    fn test_remote_deliver_fails() {
        let stream = DataStream::remote(Uuid::new_v4(), 3);
        let err = stream.deliver().err().unwrap();
        assert!(matches!(err, DataStreamError::MissingProducer { .. }));
    }

    #[tokio::test]
    async fn test_transmit_async_returns_sink() {
        let stream = DataStream::from_stream(Cursor::new(vec![5u8; 300_000])).unwrap();
        let sink = stream.transmit_async(Vec::new()).await.unwrap();
        assert_eq!(sink.len(), 300_000);
    }

    #[tokio::test]
    async fn test_deliver_async_remote_fails() {
        let stream = DataStream::remote(Uuid::new_v4(), 1);
        let err = stream.deliver_async().await.err().unwrap();
        assert!(matches!(err, DataStreamError::MissingProducer { .. }));
    }
}
