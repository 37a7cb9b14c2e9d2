//! Link-container decryption.
//!
//! Protection gateways hand out "click'n'load" style containers: an
//! obfuscated hex key (`jk`) next to a base64 AES-CBC blob (`crypted`). This
//! module recovers the plaintext URL list from a single container and runs
//! that recovery across a batch of mirror entries without letting one broken
//! entry spoil the rest.

pub mod batch;
pub mod cnl;
pub mod key;

use std::fmt;

use thiserror::Error;

pub use batch::{BatchReport, ContentItem, ItemDiagnostic, ItemOutcome, decrypt_all};
pub use cnl::{LinkContainerPayload, decrypt};
pub use key::fix_key;

/// Result alias used by the container decoder.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Decoding step that rejected its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Base64,
    Hex,
    Utf8,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeStage::Base64 => write!(f, "base64"),
            DecodeStage::Hex => write!(f, "hex"),
            DecodeStage::Utf8 => write!(f, "utf8"),
        }
    }
}

/// Failures raised while turning a container into URLs.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("malformed container payload: {0}")]
    MalformedPayload(String),
    #[error("invalid container key: expected more than 16 hex characters, got {0}")]
    InvalidKey(usize),
    #[error("{stage} decoding failed: {reason}")]
    Decode { stage: DecodeStage, reason: String },
    #[error("cipher error: {0}")]
    Cipher(String),
}

impl ContainerError {
    pub(crate) fn decode(stage: DecodeStage, reason: impl fmt::Display) -> Self {
        ContainerError::Decode {
            stage,
            reason: reason.to_string(),
        }
    }

    /// Decode stage for [`ContainerError::Decode`], `None` otherwise.
    pub fn stage(&self) -> Option<DecodeStage> {
        match self {
            ContainerError::Decode { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
