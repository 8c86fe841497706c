//! Keyset cursor pagination for lookup — no OFFSET, constant-time
//! page retrieval regardless of position.
//!
//! The cursor is the (trust score, id) keyset of the last row on the
//! previous page, serialized as base64 JSON so callers can treat it
//! as an opaque continuation token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Composite continuation point: (last trust score, last id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationCursor {
    pub last_trust: f64,
    pub last_id: String,
}

impl PaginationCursor {
    /// Encode as an opaque token.
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token. Malformed tokens read as `None`; callers treat
    /// that as "start from the beginning".
    pub fn decode(token: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips() {
        let cursor = PaginationCursor {
            last_trust: 0.75,
            last_id: "PAT:abc123def456".to_string(),
        };
        let token = cursor.encode();
        assert_eq!(PaginationCursor::decode(&token), Some(cursor));
    }

    #[test]
    fn malformed_tokens_decode_to_none() {
        assert_eq!(PaginationCursor::decode("not base64 ???"), None);
        assert_eq!(PaginationCursor::decode(""), None);
        let not_json = URL_SAFE_NO_PAD.encode("plain text");
        assert_eq!(PaginationCursor::decode(&not_json), None);
    }
}
