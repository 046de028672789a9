//! # Newline-delimited JSON framing for [`LifecycleMessage`].
//!
//! Wraps [`LinesCodec`] and (de)serializes each line with `serde_json`.
//!
//! ## Rules
//! - One message per line, `\n` terminated.
//! - Blank lines are skipped.
//! - Lines that are not a known message are logged at debug level and **skipped**;
//!   a stray line never tears down the channel.
//! - Lines longer than [`LifecycleCodec::MAX_FRAME`] are an error.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::debug;

use crate::error::CodecError;
use crate::ipc::LifecycleMessage;

/// Codec for the supervisor ⇄ worker lifecycle channel.
#[derive(Debug)]
pub struct LifecycleCodec {
    lines: LinesCodec,
}

impl LifecycleCodec {
    /// Maximum accepted line length in bytes.
    pub const MAX_FRAME: usize = 64 * 1024;

    /// Creates a codec with the default frame limit.
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(Self::MAX_FRAME),
        }
    }
}

impl Default for LifecycleCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LifecycleCodec {
    type Item = LifecycleMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(line) = self.lines.decode(src).map_err(map_lines_err)? else {
                return Ok(None);
            };
            if let Some(msg) = parse_line(&line) {
                return Ok(Some(msg));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(line) = self.lines.decode_eof(src).map_err(map_lines_err)? else {
                return Ok(None);
            };
            if let Some(msg) = parse_line(&line) {
                return Ok(Some(msg));
            }
        }
    }
}

impl Encoder<LifecycleMessage> for LifecycleCodec {
    type Error = CodecError;

    fn encode(&mut self, item: LifecycleMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = serde_json::to_string(&item)?;
        self.lines.encode(line, dst).map_err(map_lines_err)
    }
}

fn parse_line(line: &str) -> Option<LifecycleMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(msg) => Some(msg),
        Err(e) => {
            debug!(line = trimmed, error = %e, "skipping unrecognized lifecycle frame");
            None
        }
    }
}

fn map_lines_err(err: LinesCodecError) -> CodecError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => CodecError::FrameTooLong {
            max: LifecycleCodec::MAX_FRAME,
        },
        LinesCodecError::Io(e) => CodecError::Io(e),
    }
}
