//! # linkcrypt-rs
//!
//! The two pieces of download-link gateway automation that are actual
//! algorithms rather than site glue:
//!
//! - decrypting "click'n'load" link containers (`jk` key + `crypted` blob)
//!   into the URLs they protect, one container or a whole mirror list at a
//!   time;
//! - resolving the outlier-image captcha gateways show before releasing a
//!   container.
//!
//! HTTP, sessions and hostname configuration belong to the caller and come
//! in through the [`GatewayFetcher`] and [`HostResolver`] traits.
//!
//! ## Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use linkcrypt_rs::{CaptchaResolver, ContentItem, ReqwestGatewayFetcher, decrypt_all};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = CaptchaResolver::new(Arc::new(ReqwestGatewayFetcher::new()?));
//!     let hosts = HashMap::from([("al".to_string(), "gateway.example".to_string())]);
//!     let solved = resolver.resolve(&hosts, "al").await?;
//!     println!("submitted {} -> {}", solved.selected_id, solved.server_response_text);
//!
//!     let items: Vec<ContentItem> = serde_json::from_str(r#"[{"hoster": "rapidgator"}]"#)?;
//!     let report = decrypt_all(&items, Some("rapidgator"));
//!     println!("{:?}", report.urls);
//!     Ok(())
//! }
//! ```

pub mod captcha;
pub mod config;
pub mod containers;
pub mod transport;

pub use crate::captcha::{
    CandidateId,
    CaptchaChallenge,
    CaptchaError,
    CaptchaResolution,
    CaptchaResolver,
    CaptchaResult,
    NormalizedImage,
    Outlier,
    ResolutionFailed,
    ResolverState,
    aggregate_scores,
    diff_percent,
    normalize,
    select_outlier,
};

pub use crate::config::CaptchaConfig;

pub use crate::containers::{
    BatchReport,
    ContainerError,
    ContainerResult,
    ContentItem,
    DecodeStage,
    ItemDiagnostic,
    ItemOutcome,
    LinkContainerPayload,
    decrypt,
    decrypt_all,
    fix_key,
};

pub use crate::transport::{
    FetchError,
    FetchRequest,
    FetchResponse,
    GatewayFetcher,
    HostResolver,
    ReqwestGatewayFetcher,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
