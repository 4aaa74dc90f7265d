//! Opaque pagination cursors: a base64 blob of the id of the first element
//! the next page should include, with ascending ordering by id string.

use base64::Engine;
use registry_types::error::ApiError;

#[must_use]
pub fn encode(first_id: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(first_id.as_bytes())
}

/// # Errors
///
/// Returns [`ApiError::bad_cursor`] if `cursor` isn't valid base64 or UTF-8.
pub fn decode(cursor: &str) -> Result<String, ApiError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| ApiError::bad_cursor())?;
    String::from_utf8(bytes).map_err(|_| ApiError::bad_cursor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let encoded = encode("aas-1234");
        assert_eq!(decode(&encoded).unwrap(), "aas-1234");
    }

    #[test]
    fn rejects_malformed_cursor() {
        assert!(decode("not base64!!").is_err());
    }
}
