//! Lazily produced payloads for message-oriented transports.
//!
//! A [`DataStream`] can be placed in a message long before its bytes exist.
//! Only its envelope (id + length) crosses the wire; the bytes are copied
//! later, straight from the producer into whichever receiver the consuming
//! side chose.
//!
//! # Architecture
//!
//! ```text
//! +--------------+     +--------------+     +--------------+
//! |   Producer   | --> |  DataStream  | --> |   Receiver   |
//! | (bytes/text/ |     | (id, length, |     | (memory/file/|
//! |  stream)     |     |  writer)     |     |  custom)     |
//! +--------------+     +--------------+     +--------------+
//!                            |
//!                      AdaptiveCopy (8KB..256KB buffer, 0-100 progress)
//! ```

pub mod copy;
pub mod encoding;
pub mod envelope;
pub mod handle;
pub mod receiver;
pub mod writer;

pub use copy::{buffer_size, no_progress, progress_bar, AdaptiveCopy, ProgressFn};
pub use encoding::TextEncoding;
pub use envelope::{
    read_envelope, write_envelope, DataStreamRef, ENVELOPE_PAYLOAD_LEN, ENVELOPE_TYPE,
};
pub use handle::{DataStream, Producer, ReceiverSlot};
pub use receiver::{DataStreamReceiver, FileReceiver, InMemoryReceiver};
pub use writer::{BytesWriter, PayloadWriter, StreamWriter, TextWriter};
