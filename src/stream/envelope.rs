//! The part of a data stream that crosses a message boundary.
//!
//! Only the id and length travel; the writer and receiver stay in the
//! process that created them. A decoded envelope becomes a remote reference.
//!
//! JSON form: `{"id": "<uuid>", "length": <i64>}`
//!
//! Binary frame (big-endian): `len:u32 | type:u8 | id:[u8; 16] | length:i64`

use crate::error::{DataStreamError, Result};
use crate::stream::handle::DataStream;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// Frame type tag for a data stream reference
pub const ENVELOPE_TYPE: u8 = 0x01;

/// Payload size: 16 byte id + 8 byte length
pub const ENVELOPE_PAYLOAD_LEN: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataStreamRef {
    pub id: Uuid,
    pub length: i64,
}

impl DataStreamRef {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(5 + ENVELOPE_PAYLOAD_LEN as usize);
        buf.put_u32(ENVELOPE_PAYLOAD_LEN);
        buf.put_u8(ENVELOPE_TYPE);
        buf.put_slice(self.id.as_bytes());
        buf.put_i64(self.length);
        buf.freeze()
    }

    /// Decode a payload with the frame header already stripped.
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.remaining() < ENVELOPE_PAYLOAD_LEN as usize {
            return Err(DataStreamError::Envelope(format!(
                "payload too short: {} bytes",
                payload.remaining()
            )));
        }
        let mut id = [0u8; 16];
        payload.copy_to_slice(&mut id);
        Ok(Self {
            id: Uuid::from_bytes(id),
            length: payload.get_i64(),
        })
    }

    /// Decode a complete frame, header included.
    pub fn decode_frame(mut frame: Bytes) -> Result<Self> {
        if frame.remaining() < 5 {
            return Err(DataStreamError::Envelope("frame header truncated".to_string()));
        }
        let len = frame.get_u32();
        let msg_type = frame.get_u8();
        check_header(len, msg_type)?;
        Self::decode(frame)
    }

    /// Rebuild the handle this envelope refers to.
    pub fn into_stream(self) -> Result<DataStream> {
        DataStream::try_from(self)
    }
}

fn check_header(len: u32, msg_type: u8) -> Result<()> {
    if msg_type != ENVELOPE_TYPE {
        return Err(DataStreamError::Envelope(format!(
            "unexpected frame type 0x{:02X}",
            msg_type
        )));
    }
    if len != ENVELOPE_PAYLOAD_LEN {
        return Err(DataStreamError::Envelope(format!(
            "unexpected payload length {}",
            len
        )));
    }
    Ok(())
}

impl From<&DataStream> for DataStreamRef {
    fn from(stream: &DataStream) -> Self {
        Self {
            id: stream.id(),
            length: i64::try_from(stream.length()).unwrap_or(i64::MAX),
        }
    }
}

impl From<DataStream> for DataStreamRef {
    fn from(stream: DataStream) -> Self {
        Self::from(&stream)
    }
}

impl TryFrom<DataStreamRef> for DataStream {
    type Error = DataStreamError;

    fn try_from(envelope: DataStreamRef) -> Result<Self> {
        let length =
            u64::try_from(envelope.length).map_err(|_| DataStreamError::InvalidLength(envelope.length))?;
        Ok(DataStream::remote(envelope.id, length))
    }
}

/// Read one envelope frame from the stream.
pub async fn read_envelope<R: AsyncRead + Unpin>(r: &mut R) -> Result<DataStreamRef> {
    let len = r.read_u32().await?;
    let msg_type = r.read_u8().await?;
    check_header(len, msg_type)?;

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await?;
    DataStreamRef::decode(Bytes::from(payload))
}

/// Write one envelope frame to the stream.
pub async fn write_envelope<W: AsyncWrite + Unpin>(w: &mut W, envelope: &DataStreamRef) -> Result<()> {
    w.write_all(&envelope.encode()).await?;
    Ok(())
}
