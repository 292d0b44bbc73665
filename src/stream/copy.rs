//! Adaptive copy from a seekable source into a sink.
//!
//! The buffer is sized to roughly 1% of the payload, bounded between
//! 8KB and 256KB, so progress granularity and chunk size stay correlated.
//! Progress is reported as a whole percentage and only when it changes.

use crate::config::CopyConfig;
use crate::error::Result;
use indicatif::ProgressBar;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

/// Progress callback, called with 0..=100
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Callback that ignores progress
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// Drive an indicatif bar from copy progress.
pub fn progress_bar(bar: ProgressBar) -> ProgressFn {
    bar.set_length(100);
    Arc::new(move |percent| {
        bar.set_position(u64::from(percent));
        if percent == 100 {
            bar.finish();
        }
    })
}

/// Buffer size for a payload of `total_len` bytes using the default bounds.
pub fn buffer_size(total_len: u64) -> usize {
    AdaptiveCopy::default().buffer_size(total_len)
}

/// Whole percentage of `copied` over `total`, clamped to 100.
fn percent(copied: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let p = u128::from(copied) * 100 / u128::from(total);
    p.min(100) as u8
}

/// Copy engine with configurable buffer bounds
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveCopy {
    config: CopyConfig,
}

impl AdaptiveCopy {
    /// Engine with custom bounds. Fails if `min_buffer_size` is zero or
    /// exceeds `max_buffer_size`.
    pub fn new(config: CopyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CopyConfig {
        &self.config
    }

    pub fn buffer_size(&self, total_len: u64) -> usize {
        let one_percent = total_len / 100;
        if one_percent <= self.config.min_buffer_size as u64 {
            return self.config.min_buffer_size;
        }
        if one_percent >= self.config.max_buffer_size as u64 {
            return self.config.max_buffer_size;
        }
        one_percent as usize
    }

    /// Copy everything from the start of `source` into `dest`.
    ///
    /// `total_len` is the declared length used for buffer sizing and
    /// progress. The callback sees a strictly changing sequence that always
    /// ends with exactly one `100`. Returns the number of bytes copied.
    ///
    /// I/O errors from either side are returned as-is; bytes already
    /// written are not rolled back.
    pub fn copy<R, W>(
        &self,
        source: &mut R,
        dest: &mut W,
        total_len: u64,
        on_progress: &dyn Fn(u8),
    ) -> Result<u64>
    where
        R: Read + Seek + ?Sized,
        W: Write + ?Sized,
    {
        let mut buf = vec![0u8; self.buffer_size(total_len)];
        tracing::debug!(
            total_len,
            buffer_size = buf.len(),
            "Starting adaptive copy"
        );

        source.seek(SeekFrom::Start(0))?;

        let mut copied = 0u64;
        let mut reported: u8 = 0;

        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            dest.write_all(&buf[..n])?;
            copied += n as u64;

            let now = percent(copied, total_len);
            if now != reported {
                on_progress(now);
                reported = now;
            }
        }

        if reported != 100 {
            on_progress(100);
        }

        dest.flush()?;

        if copied != total_len {
            tracing::debug!(
                copied,
                total_len,
                "Copied byte count differs from declared length"
            );
        }
        tracing::debug!(copied, "Adaptive copy finished");

        Ok(copied)
    }
}
