//! One-time password issuance and verification.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::OtpError;

/// Issued code as stored (and mirrored) per email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRecord {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// A freshly issued code.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedOtp {
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedOtp {
    /// What the caller is told; the code itself only when `reveal` is set.
    pub fn dispatch(self, reveal: bool) -> OtpDispatch {
        OtpDispatch {
            email: self.email,
            expires_at: self.expires_at,
            code: reveal.then_some(self.code),
        }
    }
}

/// Notice that a code was sent.
#[derive(Debug, Clone, Serialize)]
pub struct OtpDispatch {
    pub email: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Codes keyed by lower-cased email. Single use; expired entries are purged
/// whenever the store is touched.
#[derive(Debug)]
pub struct OtpStore {
    codes: HashMap<String, OtpRecord>,
    ttl: Duration,
}

impl OtpStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: HashMap::new(),
            ttl,
        }
    }

    pub fn restore(ttl: Duration, codes: HashMap<String, OtpRecord>) -> Self {
        Self { codes, ttl }
    }

    pub fn records(&self) -> &HashMap<String, OtpRecord> {
        &self.codes
    }

    /// Issue a new 6-digit code, replacing any previous one for `email`.
    pub fn issue(&mut self, email: &str, now: DateTime<Utc>) -> IssuedOtp {
        self.purge_expired(now);
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        let expires_at = now + self.ttl;
        self.codes.insert(
            normalize(email),
            OtpRecord {
                code: code.clone(),
                expires_at,
            },
        );
        IssuedOtp {
            email: email.to_string(),
            code,
            expires_at,
        }
    }

    /// Check `code` against the last one issued for `email`, consuming it on
    /// success. A mismatch leaves the record in place so it can be retried.
    pub fn verify(&mut self, email: &str, code: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        let key = normalize(email);
        let record = self
            .codes
            .get(&key)
            .ok_or_else(|| OtpError::NotFound(email.to_string()))?;

        if record.expires_at <= now {
            self.codes.remove(&key);
            return Err(OtpError::Expired(email.to_string()));
        }

        if record.code != code.trim() {
            return Err(OtpError::Invalid);
        }

        self.codes.remove(&key);
        self.purge_expired(now);
        Ok(())
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.codes.retain(|_, record| record.expires_at > now);
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
