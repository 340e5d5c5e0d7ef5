//! Codec for encoding and decoding Parley frames.
//!
//! Frames travel as WebSocket text messages carrying one JSON object each.
//! Outbound frames are encoded once into a shared `Arc<str>` so a broadcast
//! does not serialize per recipient.

use std::sync::Arc;
use thiserror::Error;

use crate::frames::{ClientFrame, ServerFrame};

/// Maximum inbound frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the rejected frame.
        size: usize,
        /// Limit in effect.
        max: usize,
    },

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not a JSON object of a known type.
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Encode a server frame to its JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(frame: &ServerFrame) -> Result<Arc<str>, ProtocolError> {
    let text = serde_json::to_string(frame).map_err(ProtocolError::Encode)?;
    Ok(Arc::from(text))
}

/// Decode a client frame using the default size limit.
///
/// # Errors
///
/// Returns an error if the frame is too large or malformed.
pub fn decode(data: &[u8]) -> Result<ClientFrame, ProtocolError> {
    decode_with_limit(data, MAX_FRAME_SIZE)
}

/// Decode a client frame, rejecting anything larger than `max_size` bytes.
///
/// # Errors
///
/// Returns an error if the frame is too large or malformed.
pub fn decode_with_limit(data: &[u8], max_size: usize) -> Result<ClientFrame, ProtocolError> {
    if data.len() > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size: data.len(),
            max: max_size,
        });
    }

    serde_json::from_slice(data).map_err(ProtocolError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_client_frames() {
        assert_eq!(
            decode(br#"{"type":"setUsername","username":"alice"}"#).unwrap(),
            ClientFrame::SetUsername {
                username: "alice".into()
            }
        );
        assert_eq!(
            decode(br#"{"type":"message","message":"hi"}"#).unwrap(),
            ClientFrame::Message {
                message: "hi".into()
            }
        );
    }

    #[test]
    fn test_decode_ignores_client_identity_fields() {
        let frame =
            decode(br#"{"type":"message","message":"hi","userId":99,"username":"mallory"}"#)
                .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Message {
                message: "hi".into()
            }
        );
    }

    #[test]
    fn test_decode_malformed() {
        let cases: [&[u8]; 5] = [
            b"not json",
            br#"{"message":"no type"}"#,
            br#"{"type":"dance"}"#,
            br#"{"type":"message","message":42}"#,
            br#"{"type":"setUsername"}"#,
        ];

        for case in cases {
            match decode(case) {
                Err(ProtocolError::Malformed(_)) => {}
                other => panic!("Expected Malformed error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_frame_too_large() {
        let text = format!(
            r#"{{"type":"message","message":"{}"}}"#,
            "a".repeat(MAX_FRAME_SIZE)
        );

        match decode(text.as_bytes()) {
            Err(ProtocolError::FrameTooLarge { max, .. }) => assert_eq!(max, MAX_FRAME_SIZE),
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_is_json_object() {
        let text = encode(&ServerFrame::error("nope")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "nope");
    }
}
