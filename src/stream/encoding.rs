//! Text encodings accepted by [`DataStream::from_text_with_encoding`].
//!
//! No byte order marks are written; the declared length is exactly the
//! number of encoded bytes.
//!
//! [`DataStream::from_text_with_encoding`]: crate::DataStream::from_text_with_encoding

use crate::error::{DataStreamError, Result};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// UTF-8 without BOM
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    /// 7-bit ASCII; anything above U+007F is unencodable
    Ascii,
    /// ISO-8859-1; anything above U+00FF is unencodable
    Latin1,
}

impl TextEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Ascii => "us-ascii",
            TextEncoding::Latin1 => "iso-8859-1",
        }
    }

    /// Number of bytes `text` occupies once encoded.
    ///
    /// Single-byte encodings count one byte per character, whether or not
    /// the character is representable; that failure surfaces from
    /// [`TextEncoding::encode`].
    pub fn byte_count(&self, text: &str) -> u64 {
        match self {
            TextEncoding::Utf8 => text.len() as u64,
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => text.encode_utf16().count() as u64 * 2,
            TextEncoding::Ascii | TextEncoding::Latin1 => text.chars().count() as u64,
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.byte_count(text) as usize);
        match self {
            TextEncoding::Utf8 => out.extend_from_slice(text.as_bytes()),
            TextEncoding::Utf16Le => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            TextEncoding::Utf16Be => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
            }
            TextEncoding::Ascii => self.encode_single_byte(text, 0x7F, &mut out)?,
            TextEncoding::Latin1 => self.encode_single_byte(text, 0xFF, &mut out)?,
        }
        Ok(out)
    }

    /// Encode `text` into `sink` and flush it.
    pub fn write_to(&self, text: &str, sink: &mut dyn Write) -> Result<()> {
        let bytes = self.encode(text)?;
        sink.write_all(&bytes)?;
        sink.flush()?;
        Ok(())
    }

    fn encode_single_byte(&self, text: &str, max: u32, out: &mut Vec<u8>) -> Result<()> {
        for ch in text.chars() {
            let code = ch as u32;
            if code > max {
                return Err(DataStreamError::Unencodable {
                    encoding: self.name(),
                    ch,
                });
            }
            out.push(code as u8);
        }
        Ok(())
    }
}
