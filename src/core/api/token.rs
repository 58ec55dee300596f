use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

pub const DEFAULT_EXPIRY_WARNING_MINUTES: i64 = 5;

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Expiry of a JWT, read from the unverified payload segment.
///
/// `None` when the token is malformed or carries no `exp` claim.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let trimmed = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

/// Undecodable tokens count as expired.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Some(exp) => now >= exp,
        None => true,
    }
}

pub fn is_expiring_within(token: &str, now: DateTime<Utc>, minutes: i64) -> bool {
    match expires_at(token) {
        Some(exp) => exp - now < Duration::minutes(minutes),
        None => true,
    }
}

/// Time left before expiry, never negative.
pub fn remaining(token: &str, now: DateTime<Utc>) -> Duration {
    match expires_at(token) {
        Some(exp) if exp > now => exp - now,
        _ => Duration::zero(),
    }
}

/// `"2h 5m"`, `"5m"`, or `"expired"`.
pub fn format_remaining(left: Duration) -> String {
    if left <= Duration::zero() {
        return "expired".to_string();
    }
    let hours = left.num_hours();
    let minutes = left.num_minutes() % 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
