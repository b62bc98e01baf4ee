//! Wire codec: one message per frame, five newline-terminated text fields.
//!
//! ```text
//! <timestamp: milliseconds since the Unix epoch>\n
//! <type: NORMAL | HELLO | JOINED | LEFT | LOGIN_SUCCESSFUL | REJECTED_USER_NAME>\n
//! <from>\n
//! <to>\n
//! <text>\n
//! ```
//!
//! There is no length prefix; the frame ends after the fifth line. A field
//! containing a line break cannot be framed and is rejected at encode time.
//!
//! At end of stream, a frame missing its timestamp or type is treated as a
//! clean end of stream. Missing `from`/`to`/`text` fields are read as empty.

use bytes::{BufMut, BytesMut};
use chrono::DateTime;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use crate::constants::{DEFAULT_MAX_LINE_LENGTH, FIELD_COUNT};
use crate::errors::{ChatError, Result};
use crate::message::{Message, MessageType};

/// Frame codec for [`Message`], built on a bounded [`LinesCodec`].
#[derive(Debug)]
pub struct MessageCodec {
    lines: LinesCodec,
    /// Lines of the frame currently being assembled.
    pending: Vec<String>,
}

impl MessageCodec {
    /// Codec with the default line length limit.
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Codec rejecting any line longer than `max_line_length` bytes.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line_length),
            pending: Vec::with_capacity(FIELD_COUNT),
        }
    }

    /// Longest line this codec accepts.
    pub fn max_line_length(&self) -> usize {
        self.lines.max_length()
    }

    fn finish_frame(&mut self) -> Result<Message> {
        let fields: [String; FIELD_COUNT] = std::mem::take(&mut self.pending)
            .try_into()
            .map_err(|lines: Vec<String>| {
                ChatError::MalformedFrame(format!("expected {FIELD_COUNT} fields, got {}", lines.len()))
            })?;
        let [timestamp, kind, from, to, text] = fields;
        parse_fields(&timestamp, &kind, from, to, text)
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_fields(timestamp: &str, kind: &str, from: String, to: String, text: String) -> Result<Message> {
    let millis: i64 = timestamp
        .parse()
        .map_err(|_| ChatError::MalformedFrame(format!("invalid timestamp {timestamp:?}")))?;
    let timestamp = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| ChatError::MalformedFrame(format!("timestamp out of range: {millis}")))?;
    let kind: MessageType = kind
        .parse()
        .map_err(|e: crate::message::UnknownMessageType| ChatError::MalformedFrame(e.to_string()))?;
    Ok(Message::builder()
        .timestamp(timestamp)
        .kind(kind)
        .from(from)
        .to(to)
        .text(text)
        .build())
}

fn check_field(name: &str, value: &str) -> Result<()> {
    if value.contains(['\n', '\r']) {
        return Err(ChatError::MalformedFrame(format!("{name} contains a line break")));
    }
    Ok(())
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ChatError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        while let Some(line) = self.lines.decode(src)? {
            self.pending.push(line);
            if self.pending.len() == FIELD_COUNT {
                return self.finish_frame().map(Some);
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        // Unterminated trailing line counts as a field.
        if let Some(line) = self.lines.decode_eof(src)? {
            self.pending.push(line);
        }
        if self.pending.len() < 2 {
            self.pending.clear();
            return Ok(None);
        }
        self.pending.resize(FIELD_COUNT, String::new());
        self.finish_frame().map(Some)
    }
}

impl Encoder<&Message> for MessageCodec {
    type Error = ChatError;

    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<()> {
        check_field("from", message.from())?;
        check_field("to", message.to())?;
        check_field("text", message.text())?;

        let timestamp = message.timestamp().timestamp_millis().to_string();
        let kind = message.kind().as_str();
        dst.reserve(
            timestamp.len()
                + kind.len()
                + message.from().len()
                + message.to().len()
                + message.text().len()
                + FIELD_COUNT,
        );
        for field in [timestamp.as_str(), kind, message.from(), message.to(), message.text()] {
            dst.put_slice(field.as_bytes());
            dst.put_u8(b'\n');
        }
        Ok(())
    }
}
