// Per-request failures. These are collected by the driver loop instead of
// aborting it, so each one carries enough context to be read on its own.

use crate::decode::ReplyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("sending request: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("reading response: {0}")]
    ReadBody(#[source] reqwest::Error),

    #[error("unexpected status {status}: {preview}")]
    Status { status: String, preview: String },

    #[error("unexpected response content type {content_type:?} (status {status}): {preview}")]
    ContentType {
        content_type: String,
        status: String,
        preview: String,
    },

    #[error("decoding response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("server error: {0}")]
    Rejected(ReplyError),

    #[error("server rejected the request: {0}")]
    Refused(String),

    #[error("registration change was not acknowledged")]
    NotAcknowledged,
}
