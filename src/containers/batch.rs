//! Batch decryption across the mirror entries of a release.

use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;

use super::ContainerError;
use super::cnl::{LinkContainerPayload, decrypt};

const UNKNOWN_HOSTER: &str = "<unknown>";

/// One mirror entry offered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub struct ContentItem {
    pub hoster_label: String,
    /// `None` when the entry carried no usable container: absent `cnl`, or
    /// a `jk`/`crypted` that is absent, empty or not a string.
    pub payload: Option<LinkContainerPayload>,
}

impl ContentItem {
    pub fn new(hoster_label: impl Into<String>, payload: LinkContainerPayload) -> Self {
        Self {
            hoster_label: hoster_label.into(),
            payload: Some(payload),
        }
    }

    /// Entry without container data, e.g. a direct link.
    pub fn without_payload(hoster_label: impl Into<String>) -> Self {
        Self {
            hoster_label: hoster_label.into(),
            payload: None,
        }
    }

    fn display_hoster(&self) -> &str {
        if self.hoster_label.is_empty() {
            UNKNOWN_HOSTER
        } else {
            &self.hoster_label
        }
    }
}

/// Entries are read leniently: a field of the wrong JSON type counts as
/// absent, so one malformed entry becomes a skip instead of failing the
/// whole list.
impl From<Value> for ContentItem {
    fn from(raw: Value) -> Self {
        let text = |value: Option<&Value>| value.and_then(Value::as_str).map(str::to_string);

        let payload = raw.get("cnl").and_then(|cnl| {
            match (text(cnl.get("jk")), text(cnl.get("crypted"))) {
                (Some(jk), Some(crypted)) => LinkContainerPayload::new(jk, crypted).ok(),
                _ => None,
            }
        });

        Self {
            hoster_label: text(raw.get("hoster")).unwrap_or_default(),
            payload,
        }
    }
}

/// What happened to a single entry during a batch run.
#[derive(Debug)]
pub enum ItemOutcome {
    Decrypted(usize),
    Skipped(String),
    Failed(ContainerError),
}

/// Per-entry record kept alongside the batch result.
#[derive(Debug)]
pub struct ItemDiagnostic {
    /// Position of the entry in the caller's item list.
    pub index: usize,
    pub hoster: String,
    pub outcome: ItemOutcome,
}

/// Result of [`decrypt_all`].
#[derive(Debug, Default)]
pub struct BatchReport {
    pub urls: Vec<String>,
    pub diagnostics: Vec<ItemDiagnostic>,
    /// `true` when a mirror filter matched nothing and every entry was tried.
    pub mirror_fallback: bool,
}

impl BatchReport {
    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }

    /// Diagnostics for entries that were skipped or failed.
    pub fn problems(&self) -> impl Iterator<Item = &ItemDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|diag| !matches!(diag.outcome, ItemOutcome::Decrypted(_)))
    }
}

/// Decrypt every selected entry and concatenate their URLs in entry order.
///
/// With a mirror filter only entries whose hoster label contains it
/// (case-sensitive) are tried; when none match, every entry is tried
/// instead. Entry-level failures are logged and recorded in the report,
/// never returned.
pub fn decrypt_all(items: &[ContentItem], mirror: Option<&str>) -> BatchReport {
    let mut report = BatchReport::default();
    let mirror = mirror.filter(|m| !m.is_empty());

    let mut selected: Vec<(usize, &ContentItem)> = match mirror {
        Some(mirror) => items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.hoster_label.contains(mirror))
            .collect(),
        None => items.iter().enumerate().collect(),
    };

    if let Some(mirror) = mirror
        && selected.is_empty()
    {
        info!("No items found for mirror='{mirror}'. Falling back to all content items.");
        report.mirror_fallback = true;
        selected = items.iter().enumerate().collect();
    }

    for (index, item) in selected {
        let hoster = item.display_hoster();

        let Some(payload) = item.payload.as_ref() else {
            info!("[Item {index} | hoster={hoster}] Missing 'jk' or 'crypted' -> skipping");
            report.diagnostics.push(ItemDiagnostic {
                index,
                hoster: hoster.to_string(),
                outcome: ItemOutcome::Skipped("missing 'jk' or 'crypted'".into()),
            });
            continue;
        };

        let outcome = match decrypt(payload) {
            Ok(urls) => {
                let count = urls.len();
                debug!("[Item {index} | hoster={hoster}] Decrypted {count} URLs");
                report.urls.extend(urls);
                ItemOutcome::Decrypted(count)
            }
            Err(err) => {
                info!("[Item {index} | hoster={hoster}] Error during decryption: {err}");
                ItemOutcome::Failed(err)
            }
        };

        report.diagnostics.push(ItemDiagnostic {
            index,
            hoster: hoster.to_string(),
            outcome,
        });
    }

    report
}
