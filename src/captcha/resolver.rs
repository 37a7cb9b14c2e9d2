//! Captcha resolution state machine.
//!
//! One resolution walks `REQUEST_CHALLENGE -> FETCH_IMAGES -> NORMALIZE ->
//! COMPUTE_DIFFS -> SELECT -> SUBMIT -> DONE`. The first failing state ends
//! the attempt with a [`ResolutionFailed`]; nothing is retried here. Every
//! request goes out sequentially through the caller's [`GatewayFetcher`].

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::CaptchaConfig;
use crate::transport::{FetchRequest, GatewayFetcher, HostResolver};

use super::normalize::{NormalizedImage, normalize};
use super::select::{aggregate_scores, first_max};
use super::{CaptchaError, CaptchaResult};

/// Opaque identifier of one candidate image, as issued by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Gateways send ids as JSON strings or numbers; both are kept verbatim.
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) => Some(Self(id.clone())),
            Value::Number(id) => Some(Self(id.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Candidate list returned by the gateway; always holds at least two ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    candidate_ids: Vec<CandidateId>,
}

impl CaptchaChallenge {
    pub fn new(candidate_ids: Vec<CandidateId>) -> CaptchaResult<Self> {
        if candidate_ids.len() < 2 {
            return Err(CaptchaError::protocol(format!(
                "expected at least 2 captcha candidates, got {}",
                candidate_ids.len()
            )));
        }
        Ok(Self { candidate_ids })
    }

    /// Parse the JSON array answered to a challenge request.
    pub fn from_json(value: &Value) -> CaptchaResult<Self> {
        let entries = value
            .as_array()
            .ok_or_else(|| CaptchaError::protocol("unexpected captcha ids format"))?;

        let ids = entries
            .iter()
            .map(|entry| {
                CandidateId::from_json(entry).ok_or_else(|| {
                    CaptchaError::protocol(format!("unsupported captcha id: {entry}"))
                })
            })
            .collect::<CaptchaResult<Vec<_>>>()?;

        Self::new(ids)
    }

    pub fn candidate_ids(&self) -> &[CandidateId] {
        &self.candidate_ids
    }
}

/// Successful outcome of a resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptchaResolution {
    pub selected_id: CandidateId,
    /// Sum of the chosen image's difference percentages against the others.
    pub aggregate_difference_score: f64,
    /// Submission response body, uninterpreted.
    pub server_response_text: String,
    pub candidate_count: usize,
}

impl CaptchaResolution {
    /// Aggregate score divided by the number of candidates, truncated.
    pub fn average_difference_percent(&self) -> u32 {
        average_percent(self.aggregate_difference_score, self.candidate_count)
    }
}

fn average_percent(aggregate: f64, candidates: usize) -> u32 {
    (aggregate / candidates.max(1) as f64) as u32
}

/// Steps of a resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    RequestChallenge,
    FetchImages,
    Normalize,
    ComputeDiffs,
    Select,
    Submit,
    Done,
}

impl fmt::Display for ResolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolverState::RequestChallenge => "REQUEST_CHALLENGE",
            ResolverState::FetchImages => "FETCH_IMAGES",
            ResolverState::Normalize => "NORMALIZE",
            ResolverState::ComputeDiffs => "COMPUTE_DIFFS",
            ResolverState::Select => "SELECT",
            ResolverState::Submit => "SUBMIT",
            ResolverState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a resolution attempt.
#[derive(Debug, Error)]
#[error("captcha resolution failed in {state}: {error}")]
pub struct ResolutionFailed {
    pub state: ResolverState,
    #[source]
    pub error: CaptchaError,
}

fn checkpoint<T>(state: ResolverState, result: CaptchaResult<T>) -> Result<T, ResolutionFailed> {
    match result {
        Ok(value) => {
            debug!("captcha resolver finished {state}");
            Ok(value)
        }
        Err(error) => {
            warn!("captcha resolver failed in {state}: {error}");
            Err(ResolutionFailed { state, error })
        }
    }
}

/// Solves outlier-image captchas through a caller-supplied fetcher.
///
/// Holds no per-resolution state, so one resolver can serve concurrent
/// resolutions for different gateways.
pub struct CaptchaResolver {
    fetcher: Arc<dyn GatewayFetcher>,
    config: CaptchaConfig,
}

impl CaptchaResolver {
    pub fn new(fetcher: Arc<dyn GatewayFetcher>) -> Self {
        Self {
            fetcher,
            config: CaptchaConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CaptchaConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CaptchaConfig {
        &self.config
    }

    /// Resolve the captcha of the gateway configured for `site`.
    pub async fn resolve(
        &self,
        hosts: &dyn HostResolver,
        site: &str,
    ) -> Result<CaptchaResolution, ResolutionFailed> {
        let base = checkpoint(ResolverState::RequestChallenge, self.captcha_base(hosts, site))?;
        self.resolve_at(&base).await
    }

    /// Resolve the captcha served at `captcha_base`.
    pub async fn resolve_at(
        &self,
        captcha_base: &Url,
    ) -> Result<CaptchaResolution, ResolutionFailed> {
        let challenge = checkpoint(
            ResolverState::RequestChallenge,
            self.request_challenge(captcha_base).await,
        )?;

        let downloads = checkpoint(
            ResolverState::FetchImages,
            self.fetch_images(captcha_base, &challenge).await,
        )?;

        let candidates = checkpoint(ResolverState::Normalize, normalize_candidates(downloads))?;

        let images: Vec<&NormalizedImage> = candidates.iter().map(|(_, image)| image).collect();
        let scores = checkpoint(ResolverState::ComputeDiffs, aggregate_scores(&images))?;

        let (index, aggregate_difference_score) = checkpoint(
            ResolverState::Select,
            first_max(&scores).ok_or_else(|| CaptchaError::protocol("no captcha candidates")),
        )?;
        let selected_id = candidates[index].0.clone();

        info!(
            "CAPTCHA image \"{selected_id}.png\" - difference to others: {}%",
            average_percent(aggregate_difference_score, candidates.len())
        );

        let server_response_text = checkpoint(
            ResolverState::Submit,
            self.submit(captcha_base, &selected_id).await,
        )?;

        debug!("captcha resolver reached {}", ResolverState::Done);
        Ok(CaptchaResolution {
            selected_id,
            aggregate_difference_score,
            server_response_text,
            candidate_count: candidates.len(),
        })
    }

    fn captcha_base(&self, hosts: &dyn HostResolver, site: &str) -> CaptchaResult<Url> {
        let hostname = hosts
            .hostname(site)
            .ok_or_else(|| CaptchaError::protocol(format!("no hostname configured for '{site}'")))?;

        self.config
            .captcha_base(&hostname)
            .map_err(|err| CaptchaError::protocol(format!("invalid captcha url for '{hostname}': {err}")))
    }

    async fn request_challenge(&self, captcha_base: &Url) -> CaptchaResult<CaptchaChallenge> {
        let request = FetchRequest::post_form(captcha_base.clone(), [("cID", "0"), ("rT", "1")])
            .with_timeout(self.config.challenge_timeout);
        let response = self.fetcher.fetch(request).await?;

        let ids = response.json().map_err(|_| {
            CaptchaError::protocol(format!(
                "cannot decode captcha ids (HTTP {}): {}",
                response.status,
                response.text()
            ))
        })?;

        CaptchaChallenge::from_json(&ids)
    }

    async fn fetch_images(
        &self,
        captcha_base: &Url,
        challenge: &CaptchaChallenge,
    ) -> CaptchaResult<Vec<(CandidateId, Vec<u8>)>> {
        let mut downloads = Vec::with_capacity(challenge.candidate_ids().len());

        for id in challenge.candidate_ids() {
            let request =
                FetchRequest::get(image_url(captcha_base, id)).with_timeout(self.config.image_timeout);
            let response = self.fetcher.fetch(request).await?;

            if !response.is_success() {
                return Err(CaptchaError::protocol(format!(
                    "failed to download captcha image {id} (HTTP {})",
                    response.status
                )));
            }
            if response.body.is_empty() {
                return Err(CaptchaError::protocol(format!(
                    "captcha image {id} is empty or invalid"
                )));
            }

            downloads.push((id.clone(), response.body.to_vec()));
        }

        Ok(downloads)
    }

    async fn submit(&self, captcha_base: &Url, selected: &CandidateId) -> CaptchaResult<String> {
        let request = FetchRequest::post_form(
            captcha_base.clone(),
            [("cID", "0"), ("pC", selected.as_str()), ("rT", "2")],
        )
        .with_timeout(self.config.submit_timeout);

        let response = self.fetcher.fetch(request).await?;
        Ok(response.text())
    }
}

fn image_url(captcha_base: &Url, id: &CandidateId) -> Url {
    let mut url = captcha_base.clone();
    url.query_pairs_mut()
        .append_pair("cid", "0")
        .append_pair("hash", id.as_str());
    url
}

fn normalize_candidates(
    downloads: Vec<(CandidateId, Vec<u8>)>,
) -> CaptchaResult<Vec<(CandidateId, NormalizedImage)>> {
    let mut candidates: Vec<(CandidateId, NormalizedImage)> = Vec::with_capacity(downloads.len());

    for (id, raw) in downloads {
        let image = match normalize(&raw) {
            Ok(image) => image,
            Err(CaptchaError::Image(source)) => {
                return Err(CaptchaError::ImageDecode { id, source });
            }
            Err(err) => return Err(err),
        };

        if let Some((first_id, first)) = candidates.first()
            && first.dimensions() != image.dimensions()
        {
            let (w, h) = image.dimensions();
            return Err(CaptchaError::protocol(format!(
                "captcha image {id} is {w}x{h}, expected {}x{} like {first_id}",
                first.width(),
                first.height()
            )));
        }

        candidates.push((id, image));
    }

    Ok(candidates)
}
