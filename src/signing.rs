// src/signing.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Signed URL requests. Adapters turn a [`SignedUrlRequest`] into a URL from
//! their credentials alone; nothing here touches the network.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;

use crate::constants::MAX_SIGNED_URL_EXPIRY;
use crate::error::{Result, StorageError};

/// HTTP methods a signed URL may authorize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SignMethod {
    Get,
    Put,
}

impl SignMethod {
    pub fn as_http(&self) -> &'static str {
        match self {
            SignMethod::Get => "GET",
            SignMethod::Put => "PUT",
        }
    }
}

impl fmt::Display for SignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_http())
    }
}

/// Key + method + relative expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrlRequest {
    pub key: String,
    pub method: SignMethod,
    pub expiry: Duration,
}

impl SignedUrlRequest {
    pub fn new(key: impl Into<String>, method: SignMethod, expiry: Duration) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(StorageError::Config("cannot sign an empty key".into()));
        }
        if expiry.is_zero() {
            return Err(StorageError::Config("signed URL expiry must be positive".into()));
        }
        if expiry > MAX_SIGNED_URL_EXPIRY {
            return Err(StorageError::Config(format!(
                "signed URL expiry {} exceeds the maximum of {}",
                humantime::format_duration(expiry),
                humantime::format_duration(MAX_SIGNED_URL_EXPIRY)
            )));
        }
        Ok(Self { key, method, expiry })
    }

    /// Absolute deadline measured from `now`.
    pub fn deadline_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        // expiry is bounded by MAX_SIGNED_URL_EXPIRY, so the conversion cannot overflow
        now + chrono::Duration::from_std(self.expiry).unwrap_or_else(|_| chrono::Duration::days(7))
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline_from(Utc::now())
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Keyed digest used by the shared-key signers (Azure SAS, file URLs).
pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::Config(format!("invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Parse `60s`, `15m`, `24h`, `1h30m` style durations.
pub fn parse_expiry(raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| StorageError::Config(format!("invalid expiration '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!(<SignMethod as ValueEnum>::from_str("GET", true).unwrap(), SignMethod::Get);
        assert_eq!(<SignMethod as ValueEnum>::from_str("put", true).unwrap(), SignMethod::Put);
        assert!(<SignMethod as ValueEnum>::from_str("delete", true).is_err());
    }

    #[test]
    fn expiry_parsing() {
        assert_eq!(parse_expiry("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_expiry("1h30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_expiry("soon").is_err());
    }

    #[test]
    fn expiry_bounds_are_enforced() {
        assert!(SignedUrlRequest::new("k", SignMethod::Get, Duration::ZERO).is_err());
        assert!(SignedUrlRequest::new("k", SignMethod::Get, Duration::from_secs(8 * 86400)).is_err());
        assert!(SignedUrlRequest::new("", SignMethod::Get, Duration::from_secs(60)).is_err());
        assert!(SignedUrlRequest::new("k", SignMethod::Put, Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        let hex: String = mac.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(hex, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn deadline_is_relative_to_now() {
        let req = SignedUrlRequest::new("k", SignMethod::Get, Duration::from_secs(60)).unwrap();
        let now = Utc::now();
        assert_eq!(req.deadline_from(now) - now, chrono::Duration::seconds(60));
    }
}
