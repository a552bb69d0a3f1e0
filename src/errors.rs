use std::time::Duration;

use thiserror::Error;

/// Error type returned by video decoders plugged into [`crate::decode_frames`].
pub type DecoderError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum TelloError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("no response to \"{command}\" within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("session closed")]
    SessionClosed,

    #[error("failed to configure video decoder: {0}")]
    DecoderConfig(#[source] DecoderError),

    #[error("failed to parse \"{msg}\"")]
    ParseError { msg: String },
}

pub type Result<T> = std::result::Result<T, TelloError>;
