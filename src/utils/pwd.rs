use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

use crate::errors::{Error, Result};

/// PHC string stored on the account row.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// `Ok(false)` for a wrong password, `Err` only for a malformed stored hash.
pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(Error::Argon2Error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("Correct-Horse-1").expect("Failed to hash password");

        assert!(stored.starts_with("$argon2"));
        assert!(verify_password("Correct-Horse-1", &stored).expect("Verification failed"));
        assert!(!verify_password("correct-horse-1", &stored).expect("Verification failed"));
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let first = hash_password("Secret123").unwrap();
        let second = hash_password("Secret123").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("whatever", "not-a-phc-string").is_err());
    }
}
