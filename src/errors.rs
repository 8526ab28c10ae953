// src/errors.rs

use thiserror::Error;

/// Fatal container/payload format errors, surfaced to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid PNG file signature")]
    InvalidSignature,

    #[error("PNG file is missing its IEND chunk")]
    MissingTerminator,

    #[error("character card chunk has an invalid CRC")]
    InvalidChunkCrc,

    #[error("no character card data found in PNG chunks")]
    NoCardData,

    #[error("character card payload is invalid: {0}")]
    InvalidPayload(String),

    #[error("unsupported file format: {0}")]
    UnsupportedExtension(String),
}

/// Post-build verification failure of an encoded container. This is an
/// internal invariant violation, not bad input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("encoded PNG failed self-check: {0}")]
    SelfCheckFailed(String),
}

/// Crate-level aggregate for callers that want a single error type.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("card format error: {0}")]
    Format(#[from] FormatError),

    #[error("card encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
