//! Encrypted OTP envelope
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{OtpError, Result};

/// How long an issued OTP stays valid
pub const OTP_EXPIRY_MS: i64 = 5 * 60 * 1000;

/// The payload sealed inside an OTP token.
///
/// The token is the only carrier of the OTP's identity: there is no
/// server-side lookup table, and expiry is enforced from the embedded
/// `expires_at` when the token is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpEnvelope {
    pub otp: String,
    /// Unix millis after which verification must fail
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_name: Option<String>,
}

impl OtpEnvelope {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() > self.expires_at
    }
}

/// Seals OTP envelopes into opaque tokens and opens them back up.
///
/// AES-256-GCM with a key derived from the configured secret; the random
/// nonce is prepended to the ciphertext and the whole thing is base64.
pub struct OtpSealer {
    key: [u8; 32],
}

impl OtpSealer {
    pub fn new(secret: &str) -> Self {
        let hash = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&hash);
        Self { key }
    }

    pub fn seal(&self, envelope: &OtpEnvelope) -> Result<String> {
        let plaintext = serde_json::to_vec(envelope)?;

        let cipher = Aes256Gcm::new(&self.key.into());
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| OtpError::Encryption(format!("Encryption failed: {}", e)))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    pub fn open(&self, token: &str) -> Result<OtpEnvelope> {
        let sealed = BASE64
            .decode(token)
            .map_err(|e| OtpError::InvalidToken(format!("Invalid encoding: {}", e)))?;

        if sealed.len() < 12 {
            return Err(OtpError::InvalidToken("Token too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Aes256Gcm::new(&self.key.into());

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| OtpError::InvalidToken("Decryption failed".to_string()))?;

        let envelope: OtpEnvelope = serde_json::from_slice(&plaintext)
            .map_err(|e| OtpError::InvalidToken(format!("Invalid payload: {}", e)))?;

        if envelope.otp.is_empty() {
            return Err(OtpError::InvalidToken("Missing code".to_string()));
        }

        Ok(envelope)
    }
}

/// Generate a 6-digit numeric one-time code
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000u32).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sealer() -> OtpSealer {
        OtpSealer::new("unit-test-secret")
    }

    fn envelope_expiring_at(expires_at: i64) -> OtpEnvelope {
        OtpEnvelope {
            otp: "482913".to_string(),
            expires_at,
            id: Some("C42".to_string()),
            website_name: None,
        }
    }

    #[test]
    fn test_seal_open_round_trip() {
        let sealer = sealer();
        let envelope = envelope_expiring_at(1_900_000_000_000);

        let token = sealer.seal(&envelope).unwrap();
        let opened = sealer.open(&token).unwrap();

        assert_eq!(opened.otp, "482913");
        assert_eq!(opened.id.as_deref(), Some("C42"));
        assert_eq!(opened.expires_at, 1_900_000_000_000);
    }

    #[test]
    fn test_wrong_secret_rejects_token() {
        let token = sealer().seal(&envelope_expiring_at(0)).unwrap();
        let other = OtpSealer::new("a-different-secret");

        assert!(matches!(other.open(&token), Err(OtpError::InvalidToken(_))));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let token = sealer().seal(&envelope_expiring_at(0)).unwrap();
        let mut bytes = BASE64.decode(&token).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);

        assert!(sealer().open(&tampered).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(sealer().open("not-base64!!!").is_err());
        assert!(sealer().open("AAAA").is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let expiry = Utc.timestamp_millis_opt(1_000_000).unwrap();
        let envelope = envelope_expiring_at(expiry.timestamp_millis());

        assert!(!envelope.is_expired(expiry));
        assert!(envelope.is_expired(expiry + chrono::Duration::milliseconds(1)));
        assert!(!envelope.is_expired(expiry - chrono::Duration::minutes(5)));
    }

    #[test]
    fn test_generated_otp_is_six_digits() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
