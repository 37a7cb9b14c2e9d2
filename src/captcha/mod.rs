//! Outlier-image captcha resolution.
//!
//! Gateways guard their containers behind a puzzle showing several images of
//! which exactly one differs from the rest. The images are flattened to RGB,
//! compared pairwise, and the candidate with the largest summed difference is
//! submitted back to the gateway.

pub mod diff;
pub mod normalize;
pub mod resolver;
pub mod select;

use thiserror::Error;

use crate::transport::FetchError;

pub use diff::diff_percent;
pub use normalize::{NormalizedImage, normalize};
pub use resolver::{
    CandidateId, CaptchaChallenge, CaptchaResolution, CaptchaResolver, ResolutionFailed,
    ResolverState,
};
pub use select::{Outlier, aggregate_scores, select_outlier};

/// Result alias used by the captcha pipeline.
pub type CaptchaResult<T> = Result<T, CaptchaError>;

/// Causes of a failed captcha resolution.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("challenge protocol error: {0}")]
    Protocol(String),
    #[error("gateway request failed: {0}")]
    Transport(#[from] FetchError),
    #[error("captcha image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
    #[error("captcha image {id} could not be decoded: {source}")]
    ImageDecode {
        id: CandidateId,
        #[source]
        source: image::ImageError,
    },
}

impl CaptchaError {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        CaptchaError::Protocol(reason.into())
    }
}
