//! Frame codec for the service transport.
//!
//! Frame format:
//! ```text
//! ┌──────────┬──────────┬────────────────────────┐
//! │ len (4B) │ kind(1B) │   msgpack payload      │
//! │ u32 BE   │ u8       │                        │
//! └──────────┴──────────┴────────────────────────┘
//! ```
//! Length covers the kind byte and the payload, not the 4-byte prefix.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::types::{Error, Result};

/// Frame kind: request from a client.
pub const FRAME_REQUEST: u8 = 0x01;
/// Frame kind: successful response.
pub const FRAME_RESPONSE: u8 = 0x02;
/// Frame kind: error response.
pub const FRAME_ERROR: u8 = 0xFF;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub payload: Vec<u8>,
}

/// Request envelope carried in a `FRAME_REQUEST` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub body: Value,
}

/// Error details carried in a `FRAME_ERROR` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

/// Response envelope carried in `FRAME_RESPONSE` and `FRAME_ERROR` payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            body: Some(body),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, err: &Error) -> Self {
        Self {
            id: id.into(),
            ok: false,
            body: None,
            error: Some(RpcError {
                code: err.to_wire_code().to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// Frame kind this response is written with.
    pub fn frame_kind(&self) -> u8 {
        if self.ok {
            FRAME_RESPONSE
        } else {
            FRAME_ERROR
        }
    }
}

/// Encode a value as named msgpack.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decode a msgpack payload.
pub fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(payload)?)
}

/// Read one frame from the stream.
///
/// Returns `None` on clean EOF at a frame boundary. `max_frame_bytes` caps
/// the accepted frame length.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> std::io::Result<Option<Frame>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let frame_len = u32::from_be_bytes(len_buf);
    if frame_len > max_frame_bytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes (limit {})", frame_len, max_frame_bytes),
        ));
    }
    if frame_len == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame too short: missing kind byte",
        ));
    }

    let mut data = vec![0u8; frame_len as usize];
    reader.read_exact(&mut data).await?;
    let payload = data.split_off(1);

    Ok(Some(Frame {
        kind: data[0],
        payload,
    }))
}

/// Write one frame to the stream and flush it.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    kind: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    let frame_len = u32::try_from(payload.len() + 1).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "payload exceeds u32 length")
    })?;
    writer.write_all(&frame_len.to_be_bytes()).await?;
    writer.write_all(&[kind]).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_request_frame_survives_the_wire() {
        let request = RpcRequest {
            id: "req-1".to_string(),
            service: "onebox-history".to_string(),
            method: "Describe".to_string(),
            body: serde_json::json!({"shard": 3}),
        };
        let mut wire = Vec::new();
        write_frame(&mut wire, FRAME_REQUEST, &encode(&request).unwrap())
            .await
            .unwrap();

        let frame = read_frame(&mut Cursor::new(wire), 1024).await.unwrap().unwrap();
        assert_eq!(frame.kind, FRAME_REQUEST);
        let decoded: RpcRequest = decode(&frame.payload).unwrap();
        assert_eq!(decoded.service, "onebox-history");
        assert_eq!(decoded.body["shard"], 3);
    }

    #[tokio::test]
    async fn test_clean_eof_yields_none() {
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut empty, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut wire = Vec::new();
        write_frame(&mut wire, FRAME_REQUEST, &[0u8; 64]).await.unwrap();
        let err = read_frame(&mut Cursor::new(wire), 16).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_zero_length_frame_rejected() {
        let mut wire = Cursor::new(0u32.to_be_bytes().to_vec());
        let err = read_frame(&mut wire, 16).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_failure_response_uses_error_frame() {
        let response = RpcResponse::failure("req-9", &Error::not_found("Unknown service: x"));
        assert_eq!(response.frame_kind(), FRAME_ERROR);
        let error = response.error.unwrap();
        assert_eq!(error.code, "NOT_FOUND");
        assert!(response.body.is_none());
    }
}
