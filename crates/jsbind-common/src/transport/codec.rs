use crate::protocol::error::{BridgeError, Result};
use crate::protocol::{BridgeEvent, Request, Response};

/// Largest accepted encoded message, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Newline-delimited JSON codec for bridge envelopes.
///
/// Encoded messages always end with exactly one `\n`; decoding tolerates
/// surrounding whitespace, including `\r\n` line endings.
///
/// # Example
///
/// ```
/// use jsbind_common::transport::JsonLineCodec;
/// use jsbind_common::protocol::{BridgeMessage, Request, Response};
/// use serde_json::json;
///
/// let request = Request::new(BridgeMessage::GetReferences);
/// let encoded = JsonLineCodec::encode_request(&request).unwrap();
/// assert_eq!(encoded.last(), Some(&b'\n'));
/// assert_eq!(JsonLineCodec::decode_request(&encoded).unwrap(), request);
///
/// let response = Response::success(request.id, json!(null));
/// let encoded = JsonLineCodec::encode_response(&response).unwrap();
/// assert_eq!(JsonLineCodec::decode_response(&encoded).unwrap(), response);
/// ```
pub struct JsonLineCodec;

impl JsonLineCodec {
    /// Encodes a request as one newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::JsonSerialization` if serialization fails, and
    /// `BridgeError::InvalidRequest` if the line would exceed [`MAX_MESSAGE_SIZE`].
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Self::encode_line(request)
    }

    /// Decodes one request line. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidRequest` if `data` exceeds [`MAX_MESSAGE_SIZE`],
    /// and `BridgeError::JsonSerialization` if it is not a valid request envelope.
    pub fn decode_request(data: &[u8]) -> Result<Request> {
        Self::decode_line(data)
    }

    /// Same as [`encode_request`](Self::encode_request), for responses.
    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Self::encode_line(response)
    }

    /// Same as [`decode_request`](Self::decode_request), for responses.
    pub fn decode_response(data: &[u8]) -> Result<Response> {
        Self::decode_line(data)
    }

    /// Encodes an unsolicited event line.
    pub fn encode_event(event: &BridgeEvent) -> Result<Vec<u8>> {
        Self::encode_line(event)
    }

    /// Decodes an event line.
    pub fn decode_event(data: &[u8]) -> Result<BridgeEvent> {
        Self::decode_line(data)
    }

    fn encode_line<T: serde::Serialize>(message: &T) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(message)?;
        if line.len() >= MAX_MESSAGE_SIZE {
            return Err(BridgeError::InvalidRequest(format!(
                "Message of {} bytes exceeds the {} byte limit",
                line.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        line.push(b'\n');
        Ok(line)
    }

    fn decode_line<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(BridgeError::InvalidRequest(format!(
                "Message of {} bytes exceeds the {} byte limit",
                data.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        Ok(serde_json::from_slice(data.trim_ascii())?)
    }
}
