use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::auth::repo_types::PendingReset;

const RESET_TOKEN_BYTES: usize = 20;

/// A freshly generated reset secret. Only `pending` is persisted; `plaintext` goes in the email.
pub struct IssuedResetToken {
    pub plaintext: String,
    pub pending: PendingReset,
}

/// One-way digest stored in place of the plaintext token.
pub fn digest_reset_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

pub fn issue_reset_token(now: OffsetDateTime, ttl_minutes: i64) -> IssuedResetToken {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = hex::encode(bytes);
    IssuedResetToken {
        pending: PendingReset {
            token_digest: digest_reset_token(&plaintext),
            expires_at: now + Duration::minutes(ttl_minutes),
        },
        plaintext,
    }
}

pub fn reset_url(public_base_url: &str, plaintext: &str) -> String {
    let base = public_base_url.trim_end_matches('/');
    format!("{base}/api/v1/auth/resetpassword/{plaintext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_digest_matches_plaintext() {
        let now = OffsetDateTime::now_utc();
        let issued = issue_reset_token(now, 10);
        assert_eq!(issued.plaintext.len(), RESET_TOKEN_BYTES * 2);
        assert_eq!(issued.pending.token_digest, digest_reset_token(&issued.plaintext));
        assert_ne!(issued.pending.token_digest, issued.plaintext);
        assert_eq!(issued.pending.expires_at, now + Duration::minutes(10));
    }

    #[test]
    fn tokens_are_not_repeated() {
        let now = OffsetDateTime::now_utc();
        assert_ne!(issue_reset_token(now, 10).plaintext, issue_reset_token(now, 10).plaintext);
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            digest_reset_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn reset_url_strips_trailing_slash() {
        assert_eq!(
            reset_url("http://localhost:8080/", "tok"),
            "http://localhost:8080/api/v1/auth/resetpassword/tok"
        );
    }
}
