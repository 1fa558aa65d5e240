//! Tokio codec for the newline-delimited client protocol.
//!
//! The decoder splits the byte stream into command lines, accepting `\n` or
//! `\r\n` terminators. Lines longer than the configured capacity are a
//! protocol violation: the decoder reports [`Error::CommandTooLong`] and the
//! session is expected to end. Empty lines are skipped.
//!
//! The encoder writes one [`Reply`] per line.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use open8055_protocol::{LineCodec, Reply};
//! use futures::{SinkExt, StreamExt};
//!
//! # async fn example() -> open8055_core::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:8055").await?;
//! let mut framed = Framed::new(stream, LineCodec::new());
//!
//! while let Some(line) = framed.next().await {
//!     let line = line?;
//!     framed.send(Reply::Text(line)).await?;
//! }
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::Reply;
use open8055_core::{Error, Result, constants::MAX_CMDLINE};

/// Line framing for client sessions.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Longest accepted line, excluding the terminator.
    max_line_length: usize,

    /// Bytes already scanned for a newline, so partial lines are not
    /// rescanned on every read.
    scanned: usize,
}

impl LineCodec {
    /// Create a codec with the protocol's default capacity.
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_CMDLINE)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            scanned: 0,
        }
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = Error;

    /// Extract the next non-empty line from `src`.
    ///
    /// # Errors
    ///
    /// Returns `Error::CommandTooLong` when a line exceeds the capacity,
    /// whether or not its terminator has arrived yet.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            let newline = src[self.scanned..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.scanned + offset);

            let Some(end) = newline else {
                self.scanned = src.len();
                // Allow one byte of slack for a pending '\r'
                if src.len() > self.max_line_length + 1 {
                    src.clear();
                    self.scanned = 0;
                    return Err(Error::CommandTooLong {
                        limit: self.max_line_length,
                    });
                }
                return Ok(None);
            };

            let raw = src.split_to(end + 1);
            self.scanned = 0;

            let mut line = &raw[..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            if line.len() > self.max_line_length {
                return Err(Error::CommandTooLong {
                    limit: self.max_line_length,
                });
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return Ok(Some(String::from_utf8_lossy(line).into_owned()));
        }
    }

    /// Like `decode`, but a final command the client did not terminate
    /// before closing is still returned.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !src.has_remaining() {
            return Ok(None);
        }

        let raw = src.split();
        self.scanned = 0;

        let line = raw.strip_suffix(b"\r").unwrap_or(&raw[..]);
        if line.len() > self.max_line_length {
            return Err(Error::CommandTooLong {
                limit: self.max_line_length,
            });
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        debug!(bytes = line.len(), "unterminated command at EOF");
        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }
}

impl Encoder<Reply> for LineCodec {
    type Error = Error;

    fn encode(&mut self, item: Reply, dst: &mut BytesMut) -> Result<()> {
        let line = item.to_string();
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_default() {
        assert_eq!(LineCodec::default().max_line_length(), MAX_CMDLINE);
    }

    #[test]
    fn test_decode_several_lines_in_one_read() {
        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::from(&b"Flush\r\nGetInputDigital 1\n\nReset"[..]);

        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("Flush"));
        assert_eq!(
            codec.decode(&mut buffer).unwrap().as_deref(),
            Some("GetInputDigital 1")
        );
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert_eq!(&buffer[..], b"Reset");
    }

    #[test]
    fn test_decode_line_split_across_reads() {
        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::from(&b"SetOutput"[..]);
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"Digital 3 1");
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"\n");
        assert_eq!(
            codec.decode(&mut buffer).unwrap().as_deref(),
            Some("SetOutputDigital 3 1")
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_line_at_capacity() {
        let mut codec = LineCodec::with_max_line_length(8);
        let mut buffer = BytesMut::from(&b"12345678\r\n"[..]);
        assert_eq!(
            codec.decode(&mut buffer).unwrap().as_deref(),
            Some("12345678")
        );
    }

    #[test]
    fn test_decode_overlong_terminated_line() {
        let mut codec = LineCodec::with_max_line_length(8);
        let mut buffer = BytesMut::from(&b"123456789\n"[..]);
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(Error::CommandTooLong { limit: 8 })
        ));
    }

    #[test]
    fn test_decode_overlong_unterminated_line() {
        let mut codec = LineCodec::with_max_line_length(8);
        let mut buffer = BytesMut::from(&b"0123456789"[..]);
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(Error::CommandTooLong { .. })
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_eof_keeps_unterminated_line() {
        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::from(&b"Flush\nReset\r"[..]);
        assert_eq!(codec.decode_eof(&mut buffer).unwrap().as_deref(), Some("Flush"));
        assert_eq!(codec.decode_eof(&mut buffer).unwrap().as_deref(), Some("Reset"));
        assert_eq!(codec.decode_eof(&mut buffer).unwrap(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_eof_skips_trailing_blank() {
        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::from(&b"  \r"[..]);
        assert_eq!(codec.decode_eof(&mut buffer).unwrap(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_encode_replies() {
        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::new();
        codec.encode(Reply::Value(17), &mut buffer).unwrap();
        codec.encode(Reply::Ok, &mut buffer).unwrap();
        codec
            .encode(Reply::Usage("Wait <milliseconds>"), &mut buffer)
            .unwrap();
        assert_eq!(&buffer[..], b"17\nOK\nusage: Wait <milliseconds>\n");
    }
}
