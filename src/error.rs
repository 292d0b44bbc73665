use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DataStreamError {
    #[error("Data stream {id} has no local producer; it was received as a reference and cannot be transmitted")]
    MissingProducer { id: Uuid },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Character {ch:?} cannot be encoded as {encoding}")]
    Unencodable { encoding: &'static str, ch: char },

    #[error("Invalid data stream length: {0}")]
    InvalidLength(i64),

    #[error("Malformed data stream envelope: {0}")]
    Envelope(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transmission task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, DataStreamError>;
