// Feed cursors - opaque keyset tokens over (created_at, id)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::PostKey;

pub fn encode_cursor(key: PostKey) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}:{}", key.created_at, key.id))
}

/// Inverse of `encode_cursor`. Anything else is a validation error.
pub fn decode_cursor(cursor: &str) -> AppResult<PostKey> {
    let invalid = || AppError::Validation(format!("Invalid cursor: {}", cursor));

    let bytes = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
    let (millis, id) = raw.split_once(':').ok_or_else(invalid)?;

    Ok(PostKey {
        created_at: millis.parse().map_err(|_| invalid())?,
        id: Uuid::parse_str(id).map_err(|_| invalid())?,
    })
}
