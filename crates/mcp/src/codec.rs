// Newline framing for the protocol stream

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// One frame read from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestFrame {
    /// Raw bytes of a line, without the trailing newline
    Line(Bytes),
    /// A line longer than the limit; its bytes were discarded
    Oversized,
}

/// Splits input on `\n` without decoding it.
///
/// Unlike `LinesCodec`, content never produces a decoder error: invalid
/// UTF-8 is passed through as bytes and over-long lines come out as
/// [`RequestFrame::Oversized`], so the stream stays usable afterwards.
#[derive(Debug, Clone)]
pub struct RequestLineCodec {
    max_length: usize,
    next_index: usize,
    discarding: bool,
}

impl RequestLineCodec {
    pub fn new_with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Decoder for RequestLineCodec {
    type Item = RequestFrame;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestFrame>, std::io::Error> {
        let newline = buf[self.next_index..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.next_index + offset);

        match newline {
            Some(end) => {
                self.next_index = 0;
                if self.discarding || end > self.max_length {
                    self.discarding = false;
                    buf.advance(end + 1);
                    return Ok(Some(RequestFrame::Oversized));
                }
                let mut line = buf.split_to(end + 1);
                line.truncate(end);
                Ok(Some(RequestFrame::Line(line.freeze())))
            }
            None if self.discarding || buf.len() > self.max_length => {
                self.discarding = true;
                self.next_index = 0;
                buf.clear();
                Ok(None)
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<RequestFrame>, std::io::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        // Unterminated last line
        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            buf.clear();
            Ok(Some(RequestFrame::Oversized))
        } else if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some(RequestFrame::Line(buf.split().freeze())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &[u8]) -> Option<RequestFrame> {
        Some(RequestFrame::Line(Bytes::copy_from_slice(text)))
    }

    #[test]
    fn test_splits_lines_across_reads() {
        let mut codec = RequestLineCodec::new_with_max_length(64);
        let mut buf = BytesMut::from(&b"{\"a\":1}\n{\"b\""[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), line(b"{\"a\":1}"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b":2}\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), line(b"{\"b\":2}"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_passed_through() {
        let mut codec = RequestLineCodec::new_with_max_length(64);
        let mut buf = BytesMut::from(&[0xff, 0xfe, b'{', b'\n', b'x', b'\n'][..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), line(&[0xff, 0xfe, b'{']));
        assert_eq!(codec.decode(&mut buf).unwrap(), line(b"x"));
    }

    #[test]
    fn test_oversized_line_is_skipped_once() {
        let mut codec = RequestLineCodec::new_with_max_length(8);
        let mut buf = BytesMut::from(&b"0123456789abc"[..]);

        // Nothing yet: still inside the long line
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());

        buf.extend_from_slice(b"def\nok\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(RequestFrame::Oversized));
        assert_eq!(codec.decode(&mut buf).unwrap(), line(b"ok"));

        let mut buf = BytesMut::from(&b"0123456789\nok\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(RequestFrame::Oversized));
        assert_eq!(codec.decode(&mut buf).unwrap(), line(b"ok"));
    }

    #[test]
    fn test_unterminated_last_line() {
        let mut codec = RequestLineCodec::new_with_max_length(64);
        let mut buf = BytesMut::from(&b"tail"[..]);

        assert_eq!(codec.decode_eof(&mut buf).unwrap(), line(b"tail"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }
}
