//! # datastream
//!
//! Handles for byte payloads of known length whose bytes are produced on
//! demand, copied with an adaptive buffer, and reported as 0-100 progress.

pub mod config;
pub mod error;
pub mod stream;

pub use config::{CopyConfig, DataStreamConfig};
pub use error::{DataStreamError, Result};
pub use stream::{
    DataStream, DataStreamReceiver, DataStreamRef, FileReceiver, InMemoryReceiver, PayloadWriter,
    ProgressFn, TextEncoding,
};
