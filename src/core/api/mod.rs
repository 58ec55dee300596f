//! Helpers for the admin backend the deployed site talks to.
//!
//! Responses come wrapped in `{code, message, data}`; requests carry a JWT
//! bearer token whose expiry is checked client-side.

mod envelope;
mod token;

pub use envelope::{ApiEnvelope, ApiFailure, DEFAULT_FAILURE_MESSAGE};
pub use token::{
    expires_at, format_remaining, is_expired, is_expiring_within, remaining,
    DEFAULT_EXPIRY_WARNING_MINUTES,
};
