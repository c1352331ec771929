//! `Content-Length` framing over a byte stream.
//!
//! Wire format, one frame:
//!
//! ```text
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of UTF-8 JSON>
//! ```
//!
//! [`LspCodec`] plugs into `tokio_util::codec::{FramedRead, FramedWrite}`.
//! Decoding yields `Result<Message, MessageError>` items so a frame with a
//! bad body is reported without ending the stream: the frame's bytes were
//! consumed exactly and the next frame is unaffected. A [`FramingError`]
//! ends the stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::errors::{FramingError, MessageError};
use crate::message::Message;

/// Header prefix recognised on the process output stream.
pub const CONTENT_LENGTH: &str = "Content-Length:";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum DecodeState {
    #[default]
    Header,
    Separator {
        length: usize,
    },
    Body {
        length: usize,
    },
}

/// Decoder/encoder for `Content-Length` framed JSON messages.
#[derive(Debug, Default)]
pub struct LspCodec {
    state: DecodeState,
}

impl LspCodec {
    /// Create a codec positioned at the start of a header.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Split one `\n`-terminated line (terminator included) off the buffer.
fn take_line(src: &mut BytesMut) -> Option<BytesMut> {
    let end = src.iter().position(|b| *b == b'\n')?;
    Some(src.split_to(end + 1))
}

/// Interpret one header-position line.
///
/// `Ok(Some(n))` for a valid header, `Ok(None)` for a blank or unrecognised
/// line that should be skipped.
fn parse_header_line(line: &[u8]) -> Result<Option<usize>, FramingError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end();
    if text.is_empty() {
        return Ok(None);
    }
    match text.strip_prefix(CONTENT_LENGTH) {
        Some(value) => {
            let value = value.trim();
            value
                .parse::<usize>()
                .map(Some)
                .map_err(|_| FramingError::InvalidLength(value.to_owned()))
        }
        None => {
            warn!(line = %text, "discarding unexpected line on process output");
            Ok(None)
        }
    }
}

impl Decoder for LspCodec {
    type Item = Result<Message, MessageError>;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::Header => {
                    let Some(line) = take_line(src) else {
                        return Ok(None);
                    };
                    if let Some(length) = parse_header_line(&line)? {
                        self.state = DecodeState::Separator { length };
                    }
                }
                DecodeState::Separator { length } => {
                    if take_line(src).is_none() {
                        return Ok(None);
                    }
                    self.state = DecodeState::Body { length };
                }
                DecodeState::Body { length } => {
                    if src.len() < length {
                        return Ok(None);
                    }
                    let body = src.split_to(length);
                    self.state = DecodeState::Header;
                    trace!(bytes = length, "decoded frame");
                    return Ok(Some(Message::from_slice(&body)));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        match self.state {
            DecodeState::Header => {
                if src.is_empty() {
                    return Ok(None);
                }
                // Unterminated final line.
                let line = src.split();
                match parse_header_line(&line)? {
                    Some(length) => Err(FramingError::Truncated {
                        expected: length,
                        received: 0,
                    }),
                    None => Ok(None),
                }
            }
            DecodeState::Separator { length } => {
                src.clear();
                Err(FramingError::Truncated {
                    expected: length,
                    received: 0,
                })
            }
            DecodeState::Body { length } => {
                let received = src.remaining();
                src.clear();
                Err(FramingError::Truncated {
                    expected: length,
                    received,
                })
            }
        }
    }
}

impl Encoder<Message> for LspCodec {
    type Error = FramingError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&Message>::encode(self, &item, dst)
    }
}

impl Encoder<&Message> for LspCodec {
    type Error = FramingError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.to_vec().map_err(FramingError::Encode)?;
        let header = format!("{CONTENT_LENGTH} {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use proptest::prelude::*;
    use serde_json::{Value, json};
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn msg(value: Value) -> Message {
        Message::try_from(value).unwrap()
    }

    fn decode_all(input: &[u8]) -> (Vec<Result<Message, MessageError>>, Option<FramingError>) {
        let mut codec = LspCodec::new();
        let mut buf = BytesMut::from(input);
        let mut items = Vec::new();
        loop {
            match codec.decode_eof(&mut buf) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => return (items, None),
                Err(e) => return (items, Some(e)),
            }
        }
    }

    fn encode_one(message: &Message) -> BytesMut {
        let mut buf = BytesMut::new();
        LspCodec::new().encode(message, &mut buf).unwrap();
        buf
    }

    #[test]
    fn decodes_single_frame() {
        let mut codec = LspCodec::new();
        let mut buf = BytesMut::from(&b"Content-Length: 14\r\n\r\n{\"id\":1,\"x\":2}"[..]);
        let item = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(item.as_value(), &json!({"id": 1, "x": 2}));
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encodes_exact_bytes() {
        let buf = encode_one(&msg(json!({"method": "ping"})));
        assert_eq!(&buf[..], b"Content-Length: 17\r\n\r\n{\"method\":\"ping\"}");
    }

    #[test]
    fn length_counts_utf8_bytes_not_chars() {
        let buf = encode_one(&msg(json!({"s": "é"})));
        // {"s":"é"} is 9 chars, 10 bytes.
        assert!(buf.starts_with(b"Content-Length: 10\r\n\r\n"));
        let (items, err) = decode_all(&buf);
        assert!(err.is_none());
        assert_eq!(items[0].as_ref().unwrap().as_value(), &json!({"s": "é"}));
    }

    #[test]
    fn waits_for_incomplete_header_and_body() {
        let mut codec = LspCodec::new();
        let mut buf = BytesMut::from(&b"Content-Len"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"gth: 7\r\n");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\r\n{\"a\":");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"1}");
        let item = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(item.as_value(), &json!({"a": 1}));
    }

    #[test]
    fn skips_blank_lines_before_header() {
        let (items, err) = decode_all(b"\r\n\n  \r\nContent-Length: 2\r\n\r\n[]");
        assert!(err.is_none());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().as_value(), &json!([]));
    }

    #[test]
    fn discards_noise_lines() {
        let input = b"Picked up _JAVA_OPTIONS\nContent-Length: 2\r\n\r\n{}";
        let (items, err) = decode_all(input);
        assert!(err.is_none());
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn header_value_whitespace_is_trimmed() {
        let (items, err) = decode_all(b"Content-Length:   2  \r\n\r\n{}");
        assert!(err.is_none());
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn accepts_bare_lf_line_endings() {
        let (items, err) = decode_all(b"Content-Length: 2\n\n{}");
        assert!(err.is_none());
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn non_numeric_length_is_framing_error() {
        let (items, err) = decode_all(b"Content-Length: abc\r\n\r\n{}");
        assert!(items.is_empty());
        assert!(matches!(err, Some(FramingError::InvalidLength(v)) if v == "abc"));
    }

    #[test]
    fn negative_length_is_framing_error() {
        let (_, err) = decode_all(b"Content-Length: -5\r\n\r\n{}");
        assert!(matches!(err, Some(FramingError::InvalidLength(_))));
    }

    #[test]
    fn invalid_json_body_is_item_error_and_stream_continues() {
        let input = b"Content-Length: 5\r\n\r\n{nope\
                      Content-Length: 8\r\n\r\n{\"ok\":1}";
        let (items, err) = decode_all(input);
        assert!(err.is_none());
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Err(MessageError::InvalidJson(_))));
        assert_eq!(items[1].as_ref().unwrap().as_value(), &json!({"ok": 1}));
    }

    #[test]
    fn scalar_body_is_item_error() {
        let (items, err) = decode_all(b"Content-Length: 2\r\n\r\n42");
        assert!(err.is_none());
        assert!(matches!(items[0], Err(MessageError::NotAContainer("number"))));
    }

    #[test]
    fn declared_length_too_long_is_truncated_after_good_frames() {
        let mut input = encode_one(&msg(json!({"first": true}))).to_vec();
        input.extend_from_slice(b"Content-Length: 50\r\n\r\n{\"short\":1}");
        let (items, err) = decode_all(&input);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().as_value(), &json!({"first": true}));
        match err {
            Some(FramingError::Truncated { expected, received }) => {
                assert_eq!(expected, 50);
                assert_eq!(received, 11);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn eof_after_header_is_truncated() {
        let (_, err) = decode_all(b"Content-Length: 4\r\n");
        assert!(matches!(
            err,
            Some(FramingError::Truncated {
                expected: 4,
                received: 0
            })
        ));
    }

    #[test]
    fn eof_on_unterminated_header_is_truncated() {
        let (_, err) = decode_all(b"Content-Length: 4");
        assert!(matches!(err, Some(FramingError::Truncated { expected: 4, .. })));
    }

    #[test]
    fn eof_on_unterminated_noise_is_clean_end() {
        let (items, err) = decode_all(b"bye");
        assert!(items.is_empty());
        assert!(err.is_none());
    }

    #[test]
    fn empty_stream_is_clean_end() {
        let (items, err) = decode_all(b"");
        assert!(items.is_empty());
        assert!(err.is_none());
    }

    #[test]
    fn zero_length_body_is_decode_error() {
        let (items, err) = decode_all(b"Content-Length: 0\r\n\r\n");
        assert!(err.is_none());
        assert!(matches!(items[0], Err(MessageError::InvalidJson(_))));
    }

    #[tokio::test]
    async fn framed_read_yields_messages_then_ends() {
        let mut input = Vec::new();
        input.extend_from_slice(&encode_one(&msg(json!({"n": 1}))));
        input.extend_from_slice(&encode_one(&msg(json!({"n": 2}))));
        let mut framed = FramedRead::new(&input[..], LspCodec::new());

        let first = framed.next().await.unwrap().unwrap().unwrap();
        let second = framed.next().await.unwrap().unwrap().unwrap();
        assert_eq!(first.as_value(), &json!({"n": 1}));
        assert_eq!(second.as_value(), &json!({"n": 2}));
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_read_ends_after_framing_error() {
        let input = b"Content-Length: x\r\n\r\n{}Content-Length: 2\r\n\r\n{}".to_vec();
        let mut framed = FramedRead::new(&input[..], LspCodec::new());
        assert!(matches!(
            framed.next().await,
            Some(Err(FramingError::InvalidLength(_)))
        ));
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_write_emits_whole_frames() {
        let mut out = Vec::new();
        {
            let mut framed = FramedWrite::new(&mut out, LspCodec::new());
            framed.send(msg(json!({"method": "ping"}))).await.unwrap();
            framed.send(msg(json!([1, 2]))).await.unwrap();
        }
        assert_eq!(
            out,
            b"Content-Length: 17\r\n\r\n{\"method\":\"ping\"}Content-Length: 5\r\n\r\n[1,2]"
        );
    }

    // ── Properties ──────────────────────────────────────────────────────

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 é\\\\\"\n]{0,12}".prop_map(Value::String),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        arb_leaf().prop_recursive(3, 32, 5, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..5)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        prop_oneof![
            prop::collection::vec(arb_value(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", arb_value(), 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
        .prop_map(msg)
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(message in arb_message()) {
            let buf = encode_one(&message);
            let (items, err) = decode_all(&buf);
            prop_assert!(err.is_none());
            prop_assert_eq!(items.len(), 1);
            prop_assert_eq!(items[0].as_ref().unwrap(), &message);
        }

        #[test]
        fn chunked_delivery_preserves_sequence(
            messages in prop::collection::vec(arb_message(), 1..6),
            chunk_sizes in prop::collection::vec(1usize..16, 1..64),
        ) {
            let mut wire = BytesMut::new();
            for m in &messages {
                wire.extend_from_slice(&encode_one(m));
            }

            let mut codec = LspCodec::new();
            let mut buf = BytesMut::new();
            let mut decoded = Vec::new();
            let mut sizes = chunk_sizes.iter().cycle();
            while !wire.is_empty() {
                let n = (*sizes.next().unwrap()).min(wire.len());
                buf.extend_from_slice(&wire.split_to(n));
                while let Some(item) = codec.decode(&mut buf).unwrap() {
                    decoded.push(item.unwrap());
                }
            }
            prop_assert!(codec.decode_eof(&mut buf).unwrap().is_none());
            prop_assert_eq!(decoded, messages);
        }
    }
}
