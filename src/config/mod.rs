//! Settings for the captcha resolver.
//!
//! Timeouts are not enforced here; they travel with each request to the
//! fetch capability.

use std::time::Duration;

use url::Url;

const DEFAULT_CHALLENGE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CAPTCHA_PATH: &str = "/files/captcha";

/// Timeouts and endpoint layout used while resolving a captcha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaConfig {
    pub challenge_timeout: Duration,
    pub image_timeout: Duration,
    pub submit_timeout: Duration,
    pub captcha_path: String,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            challenge_timeout: Duration::from_secs(DEFAULT_CHALLENGE_TIMEOUT_SECS),
            image_timeout: Duration::from_secs(DEFAULT_IMAGE_TIMEOUT_SECS),
            submit_timeout: Duration::from_secs(DEFAULT_SUBMIT_TIMEOUT_SECS),
            captcha_path: DEFAULT_CAPTCHA_PATH.to_string(),
        }
    }
}

impl CaptchaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_challenge_timeout(mut self, timeout: Duration) -> Self {
        self.challenge_timeout = timeout;
        self
    }

    pub fn with_image_timeout(mut self, timeout: Duration) -> Self {
        self.image_timeout = timeout;
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn with_captcha_path(mut self, path: impl Into<String>) -> Self {
        self.captcha_path = path.into();
        self
    }

    /// Captcha endpoint for a gateway host: `https://www.{hostname}{path}`.
    pub fn captcha_base(&self, hostname: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("https://www.{hostname}{}", self.captcha_path))
    }
}
