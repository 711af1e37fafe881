//! Binary frame decoding for the realtime channel.
//!
//! Every binary message starts with an 8-byte header whose first byte is
//! the message-type tag. Only the value-state table is interpreted: a flat
//! array of 24-byte records, each a 16-byte UUID followed by a
//! little-endian IEEE-754 double.
//!
//! ```text
//! offset 0        8                24               48
//!        +--------+----------------+----------------+----
//!        | header | uuid | f64 LE  | uuid | f64 LE  | ...
//!        +--------+----------------+----------------+----
//! ```

use bytes::Buf;
use uuid::Uuid;

use crate::error::Error;

/// Length of the frame header; the payload starts right after it.
pub const HEADER_LEN: usize = 8;

/// Size of one value-state record.
pub const VALUE_RECORD_LEN: usize = 24;

/// Message-type tag carried in the first byte of a binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    BinaryFile,
    ValueStates,
    TextStates,
    DaytimerEvents,
    OutOfService,
    Keepalive,
    WeatherEvents,
    Unknown(u8),
}

impl From<u8> for MessageKind {
    fn from(tag: u8) -> Self {
        match tag {
            0 => Self::Text,
            1 => Self::BinaryFile,
            2 => Self::ValueStates,
            3 => Self::TextStates,
            4 => Self::DaytimerEvents,
            5 => Self::OutOfService,
            6 => Self::Keepalive,
            7 => Self::WeatherEvents,
            other => Self::Unknown(other),
        }
    }
}

/// One decoded `(state id, value)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueState {
    /// Canonical lowercase hyphenated UUID string.
    pub id: String,
    pub value: f64,
}

/// A decoded binary frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    ValueStates(Vec<ValueState>),
    /// Any other message type; received but not interpreted.
    Other(MessageKind),
}

/// Decode one binary message.
pub fn decode(data: &[u8]) -> Result<Frame, Error> {
    let Some(&tag) = data.first() else {
        return Err(Error::Frame("empty binary message".into()));
    };

    match MessageKind::from(tag) {
        MessageKind::ValueStates => {
            let payload = data.get(HEADER_LEN..).ok_or_else(|| {
                Error::Frame(format!(
                    "value-state frame of {} bytes is shorter than its header",
                    data.len()
                ))
            })?;
            Ok(Frame::ValueStates(decode_value_states(payload)))
        }
        other => Ok(Frame::Other(other)),
    }
}

/// Decode a value-state table payload (header already stripped).
///
/// NaN values are discarded. A trailing partial record is ignored.
pub fn decode_value_states(payload: &[u8]) -> Vec<ValueState> {
    let mut buf = payload;
    let mut states = Vec::with_capacity(buf.len() / VALUE_RECORD_LEN);

    while buf.remaining() >= VALUE_RECORD_LEN {
        let mut raw = [0u8; 16];
        buf.copy_to_slice(&mut raw);
        let value = buf.get_f64_le();

        if value.is_nan() {
            continue;
        }

        states.push(ValueState {
            id: Uuid::from_bytes(raw).hyphenated().to_string(),
            value,
        });
    }

    states
}
