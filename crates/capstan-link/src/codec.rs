use bytes::{Buf, BytesMut};
use serde_json::Value;

use crate::error::RpcError;

/// Newline-delimited JSON framer.
///
/// Inbound bytes are buffered; each call to [`LineCodec::next_frame`] pops
/// one complete frame. Reads may split or coalesce frames arbitrarily, so
/// consumers must drain frames in a loop after every push until `None`.
///
/// A frame that fails to parse is logged and discarded; the remainder of
/// the buffer is untouched.
#[derive(Default)]
pub struct LineCodec {
    buffer: BytesMut,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the wire.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if any.
    pub fn next_frame(&mut self) -> Option<Value> {
        loop {
            let pos = self.buffer.iter().position(|&b| b == b'\n')?;
            let line = self.buffer.split_to(pos + 1);
            let line = &line[..pos];
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice(line) {
                Ok(value) => return Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unparseable frame");
                    continue;
                }
            }
        }
    }

    /// Drop any partial frame. Called on reconnect: bytes from the old
    /// connection must not prefix frames from the new one.
    pub fn clear(&mut self) {
        self.buffer.clear();
        // Also release capacity from a large partial frame.
        if self.buffer.capacity() > 64 * 1024 {
            self.buffer = BytesMut::new();
        }
    }

    /// Bytes currently buffered without a terminating newline.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.remaining()
    }
}

/// Encode one outbound request frame.
pub fn encode_request(id: &str, method: &str, params: &Value) -> Vec<u8> {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    });
    let mut frame = request.to_string().into_bytes();
    frame.push(b'\n');
    frame
}

/// Decode a response envelope into the caller-visible result.
///
/// Two independently error-checked levels:
///
/// 1. The transport envelope: `{id, error}` fails the call; `{id, result}`
///    succeeds.
/// 2. When `result.output` is a string, it is a remote computation's own
///    JSON document. It is parsed and its `error` field checked; on
///    success the *inner* document is the call's result.
pub fn decode_response(answer: &Value) -> Result<Value, RpcError> {
    if let Some(err) = answer.get("error") {
        if !err.is_null() {
            return Err(RpcError::Remote(err.clone()));
        }
    }

    let result = answer
        .get("result")
        .ok_or_else(|| RpcError::Malformed("no result in response".into()))?;

    if let Some(output) = result.get("output").and_then(Value::as_str) {
        let inner: Value = serde_json::from_str(output)
            .map_err(|e| RpcError::Malformed(format!("unparseable output document: {e}")))?;
        if let Some(err) = inner.get("error") {
            if !err.is_null() {
                return Err(RpcError::Remote(err.clone()));
            }
        }
        return Ok(inner);
    }

    Ok(result.clone())
}
