//! CRAM-MD5 password exchange.
//!
//! The answering side offers a random challenge in its banner
//! (`OPT CRAM-MD5-<hex>`). An originating side that sees it answers with
//! `PWD CRAM-MD5-<hex HMAC-MD5(password, challenge)>` instead of the plain
//! password.

use std::fmt;

use hmac::{Hmac, Mac};
use md5::Md5;
use rand::{RngCore, rngs::OsRng};

use crate::core::AuthError;

type HmacMd5 = Hmac<Md5>;

/// Prefix of a CRAM-MD5 `PWD` argument.
pub const CRAM_MD5_PREFIX: &str = "CRAM-MD5-";

/// Prefix shared by every CRAM digest.
pub const CRAM_PREFIX: &str = "CRAM-";

const CHALLENGE_SIZE: usize = 16;

/// Challenge bytes offered by the answering side.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge(Vec<u8>);

impl Challenge {
    /// Fresh random challenge.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; CHALLENGE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap known challenge bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Read an `OPT` token such as `CRAM-MD5-<hex>` or `CRAM-SHA1/MD5-<hex>`.
    ///
    /// `None` when the token is not a CRAM offer or MD5 is not among its digests.
    pub fn from_option(token: &str) -> Option<Self> {
        let rest = token.strip_prefix(CRAM_PREFIX)?;
        let (digests, data) = rest.rsplit_once('-')?;
        if !digests.split('/').any(|d| d.eq_ignore_ascii_case("MD5")) {
            return None;
        }
        hex::decode(data).ok().filter(|d| !d.is_empty()).map(Self)
    }

    /// Raw challenge bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// `OPT` token advertising this challenge.
    pub fn option(&self) -> String {
        format!("{}{}", CRAM_MD5_PREFIX, hex::encode(&self.0))
    }

    /// `PWD` argument proving knowledge of `password`.
    pub fn response(&self, password: &str) -> Result<String, AuthError> {
        let digest = self.mac(password)?.finalize().into_bytes();
        Ok(format!("{}{}", CRAM_MD5_PREFIX, hex::encode(digest)))
    }

    /// Check the hex digest following `CRAM-MD5-` in a `PWD` argument.
    pub fn verify(&self, password: &str, digest_hex: &str) -> Result<bool, AuthError> {
        let Ok(digest) = hex::decode(digest_hex.trim()) else {
            return Ok(false);
        };
        Ok(self.mac(password)?.verify_slice(&digest).is_ok())
    }

    fn mac(&self, password: &str) -> Result<HmacMd5, AuthError> {
        let mut mac = <HmacMd5 as Mac>::new_from_slice(password.as_bytes())
            .map_err(|e| AuthError::Cram(e.to_string()))?;
        mac.update(&self.0);
        Ok(mac)
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({})", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_md5_vector() {
        let challenge = Challenge::from_bytes(&b"what do ya want for nothing?"[..]);
        assert_eq!(
            challenge.response("Jefe").unwrap(),
            "CRAM-MD5-750c783e6ab0b503eaa86e310a5db738"
        );
        assert!(challenge.verify("Jefe", "750c783e6ab0b503eaa86e310a5db738").unwrap());
        assert!(challenge.verify("Jefe", "750C783E6AB0B503EAA86E310A5DB738").unwrap());
        assert!(!challenge.verify("jefe", "750c783e6ab0b503eaa86e310a5db738").unwrap());
        assert!(!challenge.verify("Jefe", "not hex").unwrap());
    }

    #[test]
    fn test_option_token() {
        let challenge = Challenge::from_bytes(vec![0xf0, 0x31, 0x5b]);
        assert_eq!(challenge.option(), "CRAM-MD5-f0315b");
        assert_eq!(Challenge::from_option("CRAM-MD5-f0315b"), Some(challenge.clone()));
        assert_eq!(Challenge::from_option("CRAM-SHA1/MD5-f0315b"), Some(challenge));
        assert_eq!(Challenge::from_option("CRAM-SHA1-f0315b"), None);
        assert_eq!(Challenge::from_option("CRAM-MD5-"), None);
        assert_eq!(Challenge::from_option("CRAM-MD5-xyz"), None);
        assert_eq!(Challenge::from_option("CRC"), None);
    }

    #[test]
    fn test_generated_challenges_differ() {
        let a = Challenge::generate();
        let b = Challenge::generate();
        assert_eq!(a.as_bytes().len(), CHALLENGE_SIZE);
        assert_ne!(a, b);
    }
}
