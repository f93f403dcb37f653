//! Sender/Dispatcher: one-byte type-tag framing for the `chat/1` protocol.
//!
//! Every unicast payload on `chat/1` begins with a single byte naming its
//! type. [`encode_frame`] is used by the sending side; [`decode_frame`]
//! splits an inbound frame back into its tag and body so the controller can
//! route the body to Session, the contact/command layer, or call signaling.
//! Unknown tags are reported as [`DispatchError::UnknownMessageType`] rather
//! than panicking — the caller logs and drops them.

/// Wire-level message type tag, the first byte of every `chat/1` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// An encrypted session payload (chat content or file control).
    SecureEnvelope = 1,
    /// A signed contact/command envelope.
    SignedCommand = 2,
    /// An unencrypted first-contact ping.
    PingEnvelope = 3,
    /// Call-signaling traffic (offer/answer/candidate/hangup).
    Signaling = 4,
}

impl MessageType {
    /// Parse a wire tag byte into its [`MessageType`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownMessageType`] for any byte other
    /// than 1-4.
    pub fn from_tag(tag: u8) -> Result<Self, DispatchError> {
        match tag {
            1 => Ok(MessageType::SecureEnvelope),
            2 => Ok(MessageType::SignedCommand),
            3 => Ok(MessageType::PingEnvelope),
            4 => Ok(MessageType::Signaling),
            other => Err(DispatchError::UnknownMessageType(other)),
        }
    }

    /// The wire tag byte for this message type.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Errors from framing or parsing a `chat/1` message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// The frame was empty; there was no tag byte to read.
    #[error("empty frame: missing type tag")]
    EmptyFrame,
    /// The tag byte did not name any known message type.
    #[error("unknown message type tag: {0}")]
    UnknownMessageType(u8),
}

/// Prefix `body` with `message_type`'s tag byte, ready to hand to the
/// transport layer.
pub fn encode_frame(message_type: MessageType, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + body.len());
    frame.push(message_type.tag());
    frame.extend_from_slice(body);
    frame
}

/// Split an inbound `chat/1` frame into its message type and body.
///
/// # Errors
///
/// Returns [`DispatchError::EmptyFrame`] if `frame` is empty, or
/// [`DispatchError::UnknownMessageType`] if the tag byte is not recognized.
pub fn decode_frame(frame: &[u8]) -> Result<(MessageType, &[u8]), DispatchError> {
    let (&tag, body) = frame.split_first().ok_or(DispatchError::EmptyFrame)?;
    let message_type = MessageType::from_tag(tag)?;
    Ok((message_type, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_each_message_type() {
        for mt in [
            MessageType::SecureEnvelope,
            MessageType::SignedCommand,
            MessageType::PingEnvelope,
            MessageType::Signaling,
        ] {
            let frame = encode_frame(mt, b"payload");
            let (decoded_type, body) = decode_frame(&frame).unwrap();
            assert_eq!(decoded_type, mt);
            assert_eq!(body, b"payload");
        }
    }

    #[test]
    fn empty_frame_is_rejected() {
        assert!(matches!(decode_frame(&[]), Err(DispatchError::EmptyFrame)));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let frame = [0xFFu8, 1, 2, 3];
        assert!(matches!(
            decode_frame(&frame),
            Err(DispatchError::UnknownMessageType(0xFF))
        ));
    }

    #[test]
    fn empty_body_round_trips() {
        let frame = encode_frame(MessageType::PingEnvelope, &[]);
        assert_eq!(frame, vec![3]);
        let (mt, body) = decode_frame(&frame).unwrap();
        assert_eq!(mt, MessageType::PingEnvelope);
        assert!(body.is_empty());
    }
}
