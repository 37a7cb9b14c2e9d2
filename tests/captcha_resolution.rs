use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use linkcrypt_rs::{
    CaptchaConfig, CaptchaError, CaptchaResolver, FetchError, FetchRequest, FetchResponse,
    GatewayFetcher, ResolverState,
};
use url::Url;

const BASE: &str = "https://www.gate.example/files/captcha";

/// In-memory gateway that answers like the real captcha endpoint and records
/// every request it sees.
struct StubGateway {
    challenge: FetchResponse,
    images: HashMap<String, Result<FetchResponse, String>>,
    submit_reply: String,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StubGateway {
    fn new(challenge: FetchResponse) -> Self {
        Self {
            challenge,
            images: HashMap::new(),
            submit_reply: String::from("{\"solved\": true}"),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn with_image(mut self, id: &str, response: FetchResponse) -> Self {
        self.images.insert(id.to_string(), Ok(response));
        self
    }

    fn with_broken_image(mut self, id: &str, reason: &str) -> Self {
        self.images.insert(id.to_string(), Err(reason.to_string()));
        self
    }

    fn recorded(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayFetcher for StubGateway {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requests.lock().unwrap().push(request.clone());

        if request.method == Method::GET {
            let hash = request
                .url
                .query_pairs()
                .find(|(key, _)| key == "hash")
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default();
            return match self.images.get(&hash) {
                Some(Ok(response)) => Ok(response.clone()),
                Some(Err(reason)) => Err(FetchError::Transport(reason.clone())),
                None => Ok(FetchResponse::new(404, "")),
            };
        }

        match request.form_value("rT") {
            Some("1") => Ok(self.challenge.clone()),
            Some("2") => Ok(FetchResponse::new(200, self.submit_reply.clone())),
            other => Err(FetchError::Transport(format!("unexpected rT {other:?}"))),
        }
    }
}

fn png(image: RgbImage) -> FetchResponse {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    FetchResponse::new(200, out.into_inner())
}

fn textured(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 13 % 256) as u8, (y * 7 % 256) as u8, ((x + y) * 3 % 256) as u8])
    })
}

fn textured_with_block(width: u32, height: u32) -> RgbImage {
    let mut image = textured(width, height);
    for y in 4..10 {
        for x in 5..11 {
            image.put_pixel(x, y, Rgb([255, 0, 255]));
        }
    }
    image
}

fn base() -> Url {
    Url::parse(BASE).unwrap()
}

fn three_candidates() -> StubGateway {
    StubGateway::new(FetchResponse::new(200, "[1, 2, 3]"))
        .with_image("1", png(textured(16, 16)))
        .with_image("2", png(textured_with_block(16, 16)))
        .with_image("3", png(textured(16, 16)))
}

#[tokio::test]
async fn selects_the_odd_image_and_submits_it() {
    let gateway = Arc::new(three_candidates());
    let resolver = CaptchaResolver::new(gateway.clone());

    let resolution = resolver.resolve_at(&base()).await.unwrap();

    assert_eq!(resolution.selected_id.as_str(), "2");
    assert_eq!(resolution.server_response_text, "{\"solved\": true}");
    assert_eq!(resolution.candidate_count, 3);
    assert!(resolution.aggregate_difference_score > 0.0);

    let requests = gateway.recorded();
    assert_eq!(requests.len(), 5);

    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].form_value("cID"), Some("0"));
    assert_eq!(requests[0].form_value("rT"), Some("1"));

    let fetched: Vec<String> = requests[1..4]
        .iter()
        .map(|request| request.url.query().unwrap_or_default().to_string())
        .collect();
    assert_eq!(fetched, vec!["cid=0&hash=1", "cid=0&hash=2", "cid=0&hash=3"]);

    let submission = &requests[4];
    assert_eq!(submission.method, Method::POST);
    assert_eq!(submission.url.as_str(), BASE);
    assert_eq!(submission.form_value("cID"), Some("0"));
    assert_eq!(submission.form_value("pC"), Some("2"));
    assert_eq!(submission.form_value("rT"), Some("2"));
}

#[tokio::test]
async fn passes_configured_timeouts_to_the_fetcher() {
    let gateway = Arc::new(three_candidates());
    let config = CaptchaConfig::new()
        .with_challenge_timeout(Duration::from_secs(5))
        .with_image_timeout(Duration::from_secs(6))
        .with_submit_timeout(Duration::from_secs(7));
    let resolver = CaptchaResolver::new(gateway.clone()).with_config(config);

    resolver.resolve_at(&base()).await.unwrap();

    let timeouts: Vec<Option<Duration>> = gateway
        .recorded()
        .iter()
        .map(|request| request.timeout)
        .collect();
    assert_eq!(
        timeouts,
        vec![
            Some(Duration::from_secs(5)),
            Some(Duration::from_secs(6)),
            Some(Duration::from_secs(6)),
            Some(Duration::from_secs(6)),
            Some(Duration::from_secs(7)),
        ]
    );
}

#[tokio::test]
async fn resolves_hostname_through_the_host_resolver() {
    let gateway = Arc::new(three_candidates());
    let resolver = CaptchaResolver::new(gateway.clone());
    let hosts = HashMap::from([(String::from("al"), String::from("gate.example"))]);

    let resolution = resolver.resolve(&hosts, "al").await.unwrap();

    assert_eq!(resolution.selected_id.as_str(), "2");
    assert_eq!(gateway.recorded()[0].url.as_str(), BASE);
}

#[tokio::test]
async fn unknown_site_fails_before_any_request() {
    let gateway = Arc::new(three_candidates());
    let resolver = CaptchaResolver::new(gateway.clone());
    let hosts: HashMap<String, String> = HashMap::new();

    let failure = resolver.resolve(&hosts, "al").await.unwrap_err();

    assert_eq!(failure.state, ResolverState::RequestChallenge);
    assert!(gateway.recorded().is_empty());
}

#[tokio::test]
async fn single_candidate_is_a_protocol_error() {
    let gateway = Arc::new(StubGateway::new(FetchResponse::new(200, "[\"only\"]")));
    let resolver = CaptchaResolver::new(gateway.clone());

    let failure = resolver.resolve_at(&base()).await.unwrap_err();

    assert_eq!(failure.state, ResolverState::RequestChallenge);
    assert!(matches!(failure.error, CaptchaError::Protocol(_)));
    assert_eq!(gateway.recorded().len(), 1);
}

#[tokio::test]
async fn non_json_challenge_reports_body() {
    let gateway = Arc::new(StubGateway::new(FetchResponse::new(503, "busy")));
    let resolver = CaptchaResolver::new(gateway);

    let failure = resolver.resolve_at(&base()).await.unwrap_err();

    assert_eq!(failure.state, ResolverState::RequestChallenge);
    assert!(failure.to_string().contains("busy"));
}

#[tokio::test]
async fn failed_image_download_aborts_without_submitting() {
    let gateway = Arc::new(
        StubGateway::new(FetchResponse::new(200, "[1, 2, 3]"))
            .with_image("1", png(textured(16, 16)))
            .with_image("3", png(textured(16, 16))),
    );
    let resolver = CaptchaResolver::new(gateway.clone());

    let failure = resolver.resolve_at(&base()).await.unwrap_err();

    assert_eq!(failure.state, ResolverState::FetchImages);
    assert!(failure.to_string().contains("HTTP 404"));
    // challenge + image 1 + image 2; image 3 and the submission never happen
    assert_eq!(gateway.recorded().len(), 3);
}

#[tokio::test]
async fn empty_image_body_is_fatal() {
    let gateway = Arc::new(
        StubGateway::new(FetchResponse::new(200, "[\"a\", \"b\"]"))
            .with_image("a", png(textured(8, 8)))
            .with_image("b", FetchResponse::new(200, "")),
    );
    let resolver = CaptchaResolver::new(gateway);

    let failure = resolver.resolve_at(&base()).await.unwrap_err();

    assert_eq!(failure.state, ResolverState::FetchImages);
    assert!(matches!(failure.error, CaptchaError::Protocol(_)));
}

#[tokio::test]
async fn transport_errors_surface_as_failures() {
    let gateway = Arc::new(
        StubGateway::new(FetchResponse::new(200, "[\"a\", \"b\"]"))
            .with_image("a", png(textured(8, 8)))
            .with_broken_image("b", "connection reset"),
    );
    let resolver = CaptchaResolver::new(gateway);

    let failure = resolver.resolve_at(&base()).await.unwrap_err();

    assert_eq!(failure.state, ResolverState::FetchImages);
    assert!(matches!(
        failure.error,
        CaptchaError::Transport(FetchError::Transport(_))
    ));
}

#[tokio::test]
async fn mismatched_dimensions_fail_normalization() {
    let gateway = Arc::new(
        StubGateway::new(FetchResponse::new(200, "[\"a\", \"b\"]"))
            .with_image("a", png(textured(8, 8)))
            .with_image("b", png(textured(8, 9))),
    );
    let resolver = CaptchaResolver::new(gateway.clone());

    let failure = resolver.resolve_at(&base()).await.unwrap_err();

    assert_eq!(failure.state, ResolverState::Normalize);
    assert!(matches!(failure.error, CaptchaError::Protocol(_)));
    assert_eq!(gateway.recorded().len(), 3);
}

#[tokio::test]
async fn undecodable_image_fails_normalization() {
    let gateway = Arc::new(
        StubGateway::new(FetchResponse::new(200, "[\"a\", \"b\"]"))
            .with_image("a", png(textured(8, 8)))
            .with_image("b", FetchResponse::new(200, "<html>oops</html>")),
    );
    let resolver = CaptchaResolver::new(gateway);

    let failure = resolver.resolve_at(&base()).await.unwrap_err();

    assert_eq!(failure.state, ResolverState::Normalize);
    match &failure.error {
        CaptchaError::ImageDecode { id, .. } => assert_eq!(id.as_str(), "b"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(failure.to_string().contains("captcha image b could not be decoded"));
}
