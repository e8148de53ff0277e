//! Request body decoding.
//!
//! Bodies are decoded from raw bytes regardless of `Content-Type`; older
//! clients post JSON without declaring it.

use serde::de::DeserializeOwned;

use crate::error::{ProtocolError, ProtocolResult};

/// Decode a JSON request body.
///
/// # Errors
///
/// [`ProtocolError::EmptyBody`] for an empty or all-whitespace body,
/// [`ProtocolError::MalformedBody`] when the JSON does not match `T`.
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ProtocolError::EmptyBody);
    }
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChecksumRequest, KillRequest};

    #[test]
    fn test_empty_body() {
        assert!(matches!(
            decode_body::<ChecksumRequest>(b""),
            Err(ProtocolError::EmptyBody)
        ));
        assert!(matches!(
            decode_body::<ChecksumRequest>(b" \n"),
            Err(ProtocolError::EmptyBody)
        ));
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            decode_body::<KillRequest>(b"{\"payload\":"),
            Err(ProtocolError::MalformedBody(_))
        ));
    }

    #[test]
    fn test_missing_fields_default() {
        let req: ChecksumRequest = decode_body(b"{}").unwrap();
        assert_eq!(req.uuid, "");
    }
}
