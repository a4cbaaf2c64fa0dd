//! Repository signing-key download.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::time::Duration;

/// Keys larger than this are rejected; a public key block is a few KiB.
const MAX_KEY_SIZE: u64 = 1024 * 1024;

const ARMOR_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
const ARMOR_FOOTER: &str = "-----END PGP PUBLIC KEY BLOCK-----";

/// Source of repository signing keys.
pub trait KeyFetcher: Send + Sync {
    /// Fetch the ASCII-armored key at `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches keys over HTTP(S).
pub struct HttpKeyFetcher {
    agent: ureq::Agent,
}

impl HttpKeyFetcher {
    /// Create a fetcher with a bounded overall timeout.
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for HttpKeyFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyFetcher for HttpKeyFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("Fetching signing key from {url}");
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", "aptkit")
            .call()?;

        let bytes = response
            .body_mut()
            .with_config()
            .limit(MAX_KEY_SIZE)
            .read_to_vec()?;
        Ok(bytes)
    }
}

/// Convert an ASCII-armored public key into the binary keyring format.
///
/// apt before 1.4 only reads binary keyrings through `signed-by`. The armor
/// checksum, when present, must match the decoded body.
///
/// Keyservers answer unknown fingerprints with an HTML page and status 200,
/// so a response without an armor block is rejected here as well.
pub fn dearmor(url: &str, bytes: &[u8]) -> Result<Vec<u8>> {
    let invalid = |message: &str| Error::InvalidKey {
        url: url.to_string(),
        message: message.to_string(),
    };

    let text = String::from_utf8_lossy(bytes);
    let mut lines = text.lines().map(str::trim);
    if !lines.any(|line| line == ARMOR_HEADER) {
        return Err(invalid("response is not an ASCII-armored public key"));
    }

    let mut body = String::new();
    let mut checksum = None;
    let mut in_headers = true;
    let mut terminated = false;
    for line in lines {
        if line == ARMOR_FOOTER {
            terminated = true;
            break;
        }
        if in_headers {
            in_headers = false;
            // "Version: ..." and friends, up to the first blank line
            if line.is_empty() || line.contains(": ") {
                in_headers = !line.is_empty();
                continue;
            }
        }
        if let Some(sum) = line.strip_prefix('=') {
            checksum = Some(sum.to_string());
        } else {
            body.push_str(line);
        }
    }
    if !terminated {
        return Err(invalid("armor block is not terminated"));
    }

    let key = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| invalid(&format!("armor body is not valid base64: {e}")))?;
    // Every OpenPGP packet header has the high bit set
    if key.first().is_none_or(|tag| tag & 0x80 == 0) {
        return Err(invalid("armor body is not an OpenPGP packet"));
    }

    if let Some(sum) = checksum {
        let expected = STANDARD
            .decode(sum.as_bytes())
            .map_err(|e| invalid(&format!("armor checksum is not valid base64: {e}")))?;
        if expected.as_slice() != &crc24(&key).to_be_bytes()[1..] {
            return Err(invalid("armor checksum mismatch"));
        }
    }

    Ok(key)
}

/// OpenPGP armor checksum (RFC 4880, section 6.1).
fn crc24(data: &[u8]) -> u32 {
    const INIT: u32 = 0x00B7_04CE;
    const POLY: u32 = 0x0186_4CFB;

    let mut crc = INIT;
    for &byte in data {
        crc ^= u32::from(byte) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}
