//! Single-container decoding.
//!
//! Pipeline: base64 ciphertext -> AES-128-CBC (key doubles as IV) -> strip
//! every `0x00`/`0x08` byte -> UTF-8 -> non-blank lines.

use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::Value;

use super::key::fix_key;
use super::{ContainerError, ContainerResult, DecodeStage};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Bytes the container format uses as filler; removed wherever they occur.
const FILLER_BYTES: [u8; 2] = [0x00, 0x08];

/// Key and ciphertext of one link container, as found under `cnl` in the
/// gateway's JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPayload")]
pub struct LinkContainerPayload {
    pub obfuscated_key_hex: String,
    pub cipher_text_base64: String,
}

#[derive(Deserialize)]
struct RawPayload {
    jk: String,
    crypted: String,
}

impl TryFrom<RawPayload> for LinkContainerPayload {
    type Error = ContainerError;

    fn try_from(raw: RawPayload) -> ContainerResult<Self> {
        Self::new(raw.jk, raw.crypted)
    }
}

impl LinkContainerPayload {
    /// Build a payload, rejecting empty fields.
    pub fn new(
        obfuscated_key_hex: impl Into<String>,
        cipher_text_base64: impl Into<String>,
    ) -> ContainerResult<Self> {
        let payload = Self {
            obfuscated_key_hex: obfuscated_key_hex.into(),
            cipher_text_base64: cipher_text_base64.into(),
        };

        if payload.obfuscated_key_hex.is_empty() || payload.cipher_text_base64.is_empty() {
            return Err(ContainerError::MalformedPayload(
                "missing 'jk' or 'crypted' field".into(),
            ));
        }

        Ok(payload)
    }

    /// Extract the payload from a whole gateway document
    /// (`{"links": [...], "cnl": {"jk": ..., "crypted": ...}}`).
    pub fn from_value(document: &Value) -> ContainerResult<Self> {
        let cnl = document
            .get("cnl")
            .ok_or_else(|| ContainerError::MalformedPayload("missing 'cnl' object".into()))?;

        let field = |name: &str| {
            cnl.get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self::new(field("jk"), field("crypted"))
    }

    /// Decrypt this payload. See [`decrypt`].
    pub fn decrypt(&self) -> ContainerResult<Vec<String>> {
        decrypt(self)
    }
}

/// Decrypt a link container into its URLs, in plaintext order.
///
/// Duplicates are kept. Blank and whitespace-only lines are dropped.
pub fn decrypt(payload: &LinkContainerPayload) -> ContainerResult<Vec<String>> {
    let ciphertext = decode_base64(&payload.cipher_text_base64)?;

    let fixed_key = fix_key(&payload.obfuscated_key_hex)?;
    let key = hex::decode(&fixed_key).map_err(|err| ContainerError::decode(DecodeStage::Hex, err))?;

    let plain = aes_cbc_decrypt(ciphertext, &key)?;
    let cleaned: Vec<u8> = plain
        .into_iter()
        .filter(|byte| !FILLER_BYTES.contains(byte))
        .collect();

    let text =
        String::from_utf8(cleaned).map_err(|err| ContainerError::decode(DecodeStage::Utf8, err))?;

    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

fn decode_base64(data: &str) -> ContainerResult<Vec<u8>> {
    // Gateways occasionally wrap the blob; line breaks are not part of it.
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|err| ContainerError::decode(DecodeStage::Base64, err))
}

fn aes_cbc_decrypt(mut ciphertext: Vec<u8>, key: &[u8]) -> ContainerResult<Vec<u8>> {
    let decryptor = Aes128CbcDec::new_from_slices(key, key).map_err(|_| {
        ContainerError::Cipher(format!(
            "unsupported key length {} bytes (expected 16)",
            key.len()
        ))
    })?;

    let length = ciphertext.len();
    let plain = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut ciphertext)
        .map_err(|_| {
            ContainerError::Cipher(format!(
                "ciphertext length {length} is not a multiple of the block size"
            ))
        })?;

    Ok(plain.to_vec())
}
