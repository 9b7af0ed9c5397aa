use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

use crate::consts::invite_const::INVITATION_TOKEN_LEN;

/// Returns `(token, sha256_hex(token))`. Only the hash is persisted.
pub fn generate_invitation_token() -> (String, String) {
    let token = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(INVITATION_TOKEN_LEN)
        .map(char::from)
        .collect::<String>();

    let hash = hash_token(&token);
    (token, hash)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());

    format!("{:x}", hasher.finalize())
}
