//! Envelope codec (bincode) and stream framing (4 bytes LE length + payload).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::protocol::{Envelope, Message};

pub const LEN_SIZE: usize = 4;
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024; // 16 MiB

/// Current wall clock in epoch millis. Hosts pass this into the core with every event.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Round-trip time for an envelope received at `now`. Clamped at zero when the sender's clock is ahead.
pub fn round_trip_time(now: u64, sending_time: u64) -> u64 {
    now.saturating_sub(sending_time)
}

/// Same field layout as `Envelope`, borrowing the message so segment payloads are not cloned.
#[derive(Serialize)]
struct EnvelopeRef<'a> {
    msg: &'a Message,
    sending_time: u64,
}

/// Wrap `msg` in an envelope stamped with `sending_time` and serialize it.
pub fn encode(msg: &Message, sending_time: u64) -> Result<Vec<u8>, FrameEncodeError> {
    serialize_bounded(&EnvelopeRef { msg, sending_time })
}

/// Serialize an envelope. Payloads larger than one frame are refused.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, FrameEncodeError> {
    serialize_bounded(envelope)
}

fn serialize_bounded<T: Serialize>(value: &T) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(value).map_err(FrameEncodeError::Encode)?;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(FrameEncodeError::TooLarge);
    }
    Ok(payload)
}

/// Parse an envelope payload. Returns the message and the sender's timestamp.
pub fn decode(bytes: &[u8]) -> Result<(Message, u64), MalformedMessage> {
    let envelope: Envelope = bincode::deserialize(bytes).map_err(MalformedMessage)?;
    Ok((envelope.msg, envelope.sending_time))
}

/// Payload could not be parsed as an envelope.
#[derive(Debug, thiserror::Error)]
#[error("malformed message: {0}")]
pub struct MalformedMessage(#[source] pub bincode::Error);

/// Error encoding a message (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Prefix `payload` with its length for stream transports.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameEncodeError> {
    let len = payload.len() as u32;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Split one frame off the front of `bytes`. Returns the payload and the number of bytes consumed.
/// Call with a partial buffer; `NeedMore` means try again once more data has arrived.
pub fn decode_frame(bytes: &[u8]) -> Result<(&[u8], usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN as usize {
        return Err(FrameDecodeError::TooLarge);
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    Ok((&bytes[LEN_SIZE..LEN_SIZE + len], LEN_SIZE + len))
}

/// Error splitting a frame (need more bytes or too large).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
}
