//! One-Time Password generation
//!
//! # otp
//!
//! This module houses the implementation of RFC6238 and RFC4226 for use in
//! generating Time-based One-Time Passwords from the URLs kept in TOTP
//! entries, along with a parser for the Key Uri Format those URLs follow.
//!
//! Requires the `otp` feature to be enabled (enabled by default).

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::BASE32_NOPAD;
use once_cell::sync::Lazy;
use regex::Regex;
use ring::hmac;
use zeroize::Zeroizing;

use crate::error::KpassError;
use crate::Result;

const SCHEME: &str = "^otpauth://";
const OTP_TYPE: &str = "(?P<type>totp|hotp)/";
const LABEL: &str = "(?P<label>[^?#]*)";
const QUERY: &str = "\\?(?P<query>[^#]*)";

static URI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&[SCHEME, OTP_TYPE, LABEL, QUERY].concat()).expect("Key URI pattern was invalid")
});

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl Default for HashAlgorithm {
    fn default() -> HashAlgorithm {
        HashAlgorithm::Sha1
    }
}

impl FromStr for HashAlgorithm {
    type Err = KpassError;

    fn from_str(s: &str) -> Result<HashAlgorithm> {
        match s.to_lowercase().as_ref() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(KpassError::InvalidKeyUri),
        }
    }
}

/// See RFC4226 for more information: https://tools.ietf.org/html/rfc4226
pub fn hotp(key: &[u8], counter: u64, digits: u32, algo: HashAlgorithm) -> String {
    let key = match algo {
        HashAlgorithm::Sha1 => hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key),
        HashAlgorithm::Sha256 => hmac::Key::new(hmac::HMAC_SHA256, key),
        HashAlgorithm::Sha512 => hmac::Key::new(hmac::HMAC_SHA512, key),
    };

    // HS = HMAC-SHA(K, C), with the counter hashed high-order byte first
    let hmac_result = hmac::sign(&key, &counter.to_be_bytes());
    let hmac_result = hmac_result.as_ref();

    // `offset` is in the range 0..15, inclusive
    let offset = usize::from(hmac_result[hmac_result.len() - 1] & 0xf);

    let mut snum = [0u8; 4];
    snum.copy_from_slice(&hmac_result[offset..offset + 4]);
    let snum = u32::from_be_bytes(snum) & 0x7fff_ffff;

    let code = snum % 10_u32.pow(digits);
    format!("{:0width$}", code, width = digits as usize)
}

#[derive(Debug, Default)]
pub struct TOTPBuilder {
    key: Zeroizing<Vec<u8>>,
    digits: u32,
    algo: HashAlgorithm,
    period: u64,
}

impl TOTPBuilder {
    pub fn secret<V>(&mut self, secret: V) -> &mut TOTPBuilder
    where
        V: AsRef<[u8]>,
    {
        self.key = Zeroizing::new(secret.as_ref().to_vec());

        self
    }

    pub fn base32_secret<S>(&mut self, secret: S) -> Result<&mut TOTPBuilder>
    where
        S: AsRef<str>,
    {
        let secret = secret
            .as_ref()
            .trim_end_matches('=')
            .to_ascii_uppercase();
        self.key = Zeroizing::new(
            BASE32_NOPAD
                .decode(secret.as_bytes())
                .map_err(|_| KpassError::InvalidKeyUri)?,
        );

        Ok(self)
    }

    pub fn digits(&mut self, digits: u32) -> &mut TOTPBuilder {
        self.digits = digits;

        self
    }

    pub fn algorithm(&mut self, algo: HashAlgorithm) -> &mut TOTPBuilder {
        self.algo = algo;

        self
    }

    pub fn period(&mut self, period: u64) -> &mut TOTPBuilder {
        self.period = period;

        self
    }

    pub fn build(&self) -> TOTP {
        TOTP {
            key: self.key.clone(),
            digits: if self.digits == 0 { 6 } else { self.digits },
            algo: self.algo,
            period: if self.period == 0 { 30 } else { self.period },
        }
    }
}

#[derive(Debug)]
pub struct TOTP {
    key: Zeroizing<Vec<u8>>,
    digits: u32,
    algo: HashAlgorithm,
    period: u64,
}

/// For more information see RFC6238: https://tools.ietf.org/html/rfc6238
impl TOTP {
    pub fn from_uri<S>(uri: S) -> Result<TOTP>
    where
        S: AsRef<str>,
    {
        let uri = KeyUri::parse(uri)?;
        if uri.kind != "totp" {
            return Err(KpassError::InvalidKeyUri);
        }

        Ok(TOTPBuilder::default()
            .base32_secret(&uri.secret)?
            .digits(uri.digits)
            .algorithm(uri.algorithm)
            .period(uri.period)
            .build())
    }

    pub fn generate_at(&self, timestamp: u64) -> String {
        hotp(&self.key, timestamp / self.period, self.digits, self.algo)
    }

    pub fn generate(&self) -> String {
        self.generate_at(now())
    }

    /// Seconds until the current code expires.
    pub fn remaining(&self) -> u64 {
        self.period - now() % self.period
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// A parsed `otpauth://` URI.
/// See https://github.com/google/google-authenticator/wiki/Key-Uri-Format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUri {
    pub kind: String,
    pub label: String,
    pub secret: String,
    pub issuer: Option<String>,
    pub algorithm: HashAlgorithm,
    pub digits: u32,
    pub period: u64,
}

impl KeyUri {
    pub fn parse<S>(uri: S) -> Result<KeyUri>
    where
        S: AsRef<str>,
    {
        let uri = uri.as_ref().trim();
        let captures = URI_PATTERN.captures(uri).ok_or(KpassError::InvalidKeyUri)?;
        let get = |name| captures.name(name).map_or("", |m| m.as_str());

        let mut parsed = KeyUri {
            kind: get("type").to_owned(),
            label: get("label").to_owned(),
            secret: String::new(),
            issuer: None,
            algorithm: HashAlgorithm::default(),
            digits: 6,
            period: 30,
        };

        for (key, value) in get("query").split('&').filter_map(|p| p.split_once('=')) {
            match key.to_lowercase().as_ref() {
                "secret" => parsed.secret = value.to_owned(),
                "issuer" => parsed.issuer = Some(value.to_owned()),
                "algorithm" => parsed.algorithm = value.parse()?,
                "digits" => parsed.digits = value.parse().map_err(|_| KpassError::InvalidKeyUri)?,
                "period" => parsed.period = value.parse().map_err(|_| KpassError::InvalidKeyUri)?,
                _ => {}
            }
        }

        if parsed.secret.is_empty() || !(1..=9).contains(&parsed.digits) || parsed.period == 0 {
            return Err(KpassError::InvalidKeyUri);
        }

        Ok(parsed)
    }
}
