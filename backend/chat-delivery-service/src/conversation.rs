//! Deterministic addressing of two-party conversations.
//!
//! The key is the two participant ids sorted and joined by `_`, so both
//! directions of a conversation land on the same storage partition.
//! `conversation_key` itself is total; ids that would make the key ambiguous
//! (containing the separator) are rejected at the request edge by
//! [`validate_user_id`].

use crate::error::{AppError, AppResult};

pub const KEY_SEPARATOR: char = '_';

/// Characters reserved by the conversation key or by ephemeral key patterns.
/// A backslash is the escape character of Redis `MATCH`.
const RESERVED: [char; 7] = [KEY_SEPARATOR, ':', '*', '?', '[', ']', '\\'];

const MAX_USER_ID_LEN: usize = 128;

pub fn conversation_key(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}{KEY_SEPARATOR}{second}")
}

pub fn validate_user_id(user_id: &str) -> AppResult<()> {
    if user_id.is_empty() {
        return Err(AppError::Validation("user id must not be empty".into()));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(AppError::Validation(format!(
            "user id longer than {MAX_USER_ID_LEN} bytes"
        )));
    }
    if let Some(c) = user_id
        .chars()
        .find(|c| RESERVED.contains(c) || c.is_whitespace() || c.is_control())
    {
        return Err(AppError::Validation(format!(
            "user id contains reserved character {c:?}"
        )));
    }
    Ok(())
}

/// Validate both participants and return their conversation key
pub fn checked_key(a: &str, b: &str) -> AppResult<String> {
    validate_user_id(a)?;
    validate_user_id(b)?;
    Ok(conversation_key(a, b))
}
