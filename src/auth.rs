//! Token authenticator
//!
//! Issues and validates reconnection tokens of the form
//! `base64(HMAC-SHA256(nickname || secret || uid)) + "uid" + uid`, keyed
//! with the same secret. A valid token lets a reconnecting user recover
//! their numeric id; anything else mints a fresh one.

use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::error::AuthError;
use crate::types::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Separator between the signature and the uid
const UID_SEPARATOR: &str = "uid";

/// Outcome of authenticating a connecting user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub uid: UserId,
    pub token: String,
    /// The uid was minted now rather than recovered from a token
    pub is_new: bool,
}

/// Signs tokens and hands out uids from a monotonic counter
pub struct Authenticator {
    secret: Vec<u8>,
    last_uid: AtomicU64,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("secret", &"<redacted>")
            .field("last_uid", &self.last_uid)
            .finish()
    }
}

impl Authenticator {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            last_uid: AtomicU64::new(0),
        }
    }

    /// Recover the identity behind `token`, or mint a new one
    pub fn authenticate(&self, nickname: &str, token: Option<&str>) -> Credentials {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            match self.validate(token, nickname) {
                Ok(uid) => {
                    return Credentials {
                        uid,
                        token: token.to_string(),
                        is_new: false,
                    };
                }
                Err(e) => debug!("Token rejected for '{}': {}", nickname, e),
            }
        }

        let uid = self.next_uid();
        Credentials {
            uid,
            token: self.issue(uid, nickname),
            is_new: true,
        }
    }

    /// Next uid from the counter; never returns the system id
    pub fn next_uid(&self) -> UserId {
        UserId(self.last_uid.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Sign a token binding `nickname` to `uid`
    pub fn issue(&self, uid: UserId, nickname: &str) -> String {
        let signature = self.mac(uid, nickname).finalize().into_bytes();
        format!("{}{}{}", STANDARD.encode(signature), UID_SEPARATOR, uid)
    }

    /// Check a token against `nickname`, returning the uid it carries
    pub fn validate(&self, token: &str, nickname: &str) -> Result<UserId, AuthError> {
        let pos = token
            .rfind(UID_SEPARATOR)
            .ok_or(AuthError::MissingSeparator)?;
        let (encoded, rest) = token.split_at(pos);
        let raw_uid = &rest[UID_SEPARATOR.len()..];

        let signature = STANDARD.decode(encoded)?;
        let uid = raw_uid
            .parse::<u64>()
            .ok()
            .filter(|&n| n != 0)
            .map(UserId)
            .ok_or_else(|| AuthError::InvalidUid(raw_uid.to_string()))?;

        self.mac(uid, nickname)
            .verify_slice(&signature)
            .map_err(|_| AuthError::SignatureMismatch)?;
        Ok(uid)
    }

    fn mac(&self, uid: UserId, nickname: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(nickname.as_bytes());
        mac.update(&self.secret);
        mac.update(uid.to_string().as_bytes());
        mac
    }
}
