//! Pixel difference between two normalized captcha images.

use super::normalize::NormalizedImage;
use super::{CaptchaError, CaptchaResult};

/// Share of RGB samples (in percent, `0.0..=100.0`) that differ between `a`
/// and `b`.
///
/// Symmetric in its arguments and zero for identical images. Images of
/// different size cannot be compared.
pub fn diff_percent(a: &NormalizedImage, b: &NormalizedImage) -> CaptchaResult<f64> {
    if a.dimensions() != b.dimensions() {
        return Err(CaptchaError::protocol(format!(
            "captcha images differ in size: {}x{} vs {}x{}",
            a.width(),
            a.height(),
            b.width(),
            b.height()
        )));
    }

    let total = a.samples().len();
    let changed = a
        .samples()
        .iter()
        .zip(b.samples())
        .filter(|(left, right)| left != right)
        .count();

    Ok((changed * 100) as f64 / total as f64)
}
