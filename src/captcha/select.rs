//! Picking the odd one out among candidate images.

use super::diff::diff_percent;
use super::normalize::NormalizedImage;
use super::{CaptchaError, CaptchaResult};

/// Winner of [`select_outlier`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outlier<'a, I> {
    pub index: usize,
    pub id: &'a I,
    /// Sum of the winner's difference percentages against every other image.
    pub aggregate_score: f64,
}

/// Summed pairwise difference of every image against all others.
///
/// Each pair is compared once; scores accumulate in candidate order so the
/// sums are reproducible.
pub fn aggregate_scores(images: &[&NormalizedImage]) -> CaptchaResult<Vec<f64>> {
    let mut scores = vec![0.0; images.len()];

    for i in 0..images.len() {
        for j in (i + 1)..images.len() {
            let diff = diff_percent(images[i], images[j])?;
            scores[i] += diff;
            scores[j] += diff;
        }
    }

    Ok(scores)
}

/// Index and value of the highest score; the earliest one wins ties.
pub fn first_max(scores: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best
}

/// Select the candidate whose image differs most from the others.
pub fn select_outlier<I>(candidates: &[(I, NormalizedImage)]) -> CaptchaResult<Outlier<'_, I>> {
    let images: Vec<&NormalizedImage> = candidates.iter().map(|(_, image)| image).collect();
    let scores = aggregate_scores(&images)?;

    let (index, aggregate_score) =
        first_max(&scores).ok_or_else(|| CaptchaError::protocol("no captcha candidates"))?;

    Ok(Outlier {
        index,
        id: &candidates[index].0,
        aggregate_score,
    })
}
