// File: convobot-common/src/validate.rs
//
// Boundary validation. Everything here fails fast with `Error::Validation`
// so malformed input never reaches the store.

use crate::error::Error;

/// Phone-derived user handles: digits only, country code included.
pub const USER_ID_MIN_LEN: usize = 8;
pub const USER_ID_MAX_LEN: usize = 15;

/// Channel message ids and dedup keys share the same shape limits.
pub const EXTERNAL_ID_MAX_LEN: usize = 128;

/// Upper bound for stored message text. Longer text is truncated, not
/// rejected: the ledger must always keep a readable line.
pub const MAX_TEXT_LEN: usize = 4096;

pub fn validate_user_id(user_id: &str) -> Result<(), Error> {
    if user_id.len() < USER_ID_MIN_LEN
        || user_id.len() > USER_ID_MAX_LEN
        || !user_id.chars().all(|c| c.is_ascii_digit())
    {
        return Err(Error::Validation(format!(
            "invalid user id '{}': expected {}-{} digits",
            user_id, USER_ID_MIN_LEN, USER_ID_MAX_LEN
        )));
    }
    Ok(())
}

pub fn validate_channel_message_id(id: &str) -> Result<(), Error> {
    validate_external_id(id, "channel message id")
}

pub fn validate_dedup_key(key: &str) -> Result<(), Error> {
    validate_external_id(key, "client dedup key")
}

fn validate_external_id(id: &str, what: &str) -> Result<(), Error> {
    if id.is_empty() || id.len() > EXTERNAL_ID_MAX_LEN {
        return Err(Error::Validation(format!(
            "invalid {}: must be 1-{} characters",
            what, EXTERNAL_ID_MAX_LEN
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-' | '='))
    {
        return Err(Error::Validation(format!(
            "invalid {}: unexpected character",
            what
        )));
    }
    Ok(())
}

/// Trims, strips control characters and bounds the length of a free-form
/// string field (display names, contact addresses).
pub fn sanitize_field(value: &str, max_len: usize) -> Option<String> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(max_len)
        .collect();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Bounds message text at `MAX_TEXT_LEN` characters, marking the cut.
pub fn bound_text(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_LEN {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_TEXT_LEN).collect();
    out.push_str(" [truncated]");
    out
}
