//! Shared wire framing: `type_name_ascii || '\0' || payload_bytes`.
//!
//! Payloads are `serde_json`-encoded message bodies. The broker backend
//! layers one more NUL-terminated field (the sender's client id) in front
//! of this frame on its own wire; that routing prefix lives in
//! [`crate::broker`], not here, since the websocket backend has no need
//! for it (the HTTP upgrade already identifies the connection).

use contracts::WireMessage;

use crate::error::TransportError;

/// Encodes `message` as `type_name || '\0' || json_payload`.
pub fn encode_frame<M: WireMessage>(message: &M) -> Result<Vec<u8>, TransportError> {
    let payload = serde_json::to_vec(message)?;
    let mut frame = Vec::with_capacity(M::TYPE_NAME.len() + 1 + payload.len());
    frame.extend_from_slice(M::TYPE_NAME.as_bytes());
    frame.push(0);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Splits a raw frame into its ASCII type tag and JSON payload slice.
pub fn decode_frame(frame: &[u8]) -> Result<(&str, &[u8]), TransportError> {
    let nul = frame
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| TransportError::MalformedFrame("missing type-name terminator".into()))?;
    let type_name = std::str::from_utf8(&frame[..nul])
        .map_err(|e| TransportError::MalformedFrame(e.to_string()))?;
    Ok((type_name, &frame[nul + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::RequestObservationMessage;

    #[test]
    fn round_trips_type_name_and_payload() {
        let frame = encode_frame(&RequestObservationMessage).unwrap();
        let (type_name, payload) = decode_frame(&frame).unwrap();
        assert_eq!(type_name, RequestObservationMessage::TYPE_NAME);
        let _: RequestObservationMessage = serde_json::from_slice(payload).unwrap();
    }

    #[test]
    fn rejects_frame_without_separator() {
        let err = decode_frame(b"no-separator-here").unwrap_err();
        assert!(matches!(err, TransportError::MalformedFrame(_)));
    }
}
