//! Password hashing behind a small trait so the store never sees plaintext.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordVerifier};

use invoicer_core::{DomainError, DomainResult};

/// Hashes and verifies user passwords.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> DomainResult<String>;

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable.
    fn verify(&self, password: &str, hash: &str) -> DomainResult<bool>;
}

/// Argon2id with default parameters, PHC string output.
#[derive(Debug, Default, Clone)]
pub struct Argon2PasswordHasher;

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> DomainResult<String> {
        use argon2::PasswordHasher as _;

        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| DomainError::external(format!("password hashing failed: {e}")))
    }

    fn verify(&self, password: &str, hash: &str) -> DomainResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| DomainError::external(format!("invalid password hash: {e}")))?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(DomainError::external(format!("password verify failed: {e}"))),
        }
    }
}

/// Reject passwords shorter than `min_len` characters.
pub fn validate_password(password: &str, min_len: usize) -> DomainResult<()> {
    if password.is_empty() {
        return Err(DomainError::validation("password", "Password is required"));
    }
    if password.chars().count() < min_len {
        return Err(DomainError::validation(
            "password",
            format!("Password must be at least {min_len} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_matches() {
        let hasher = Argon2PasswordHasher;
        let hash = hasher.hash("hunter22").unwrap();
        assert!(hasher.verify("hunter22", &hash).unwrap());
        assert!(!hasher.verify("wrong-password", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_mismatch() {
        let err = Argon2PasswordHasher.verify("x", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, DomainError::External(_)));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("12345678", 8).is_ok());
        match validate_password("1234567", 8) {
            Err(DomainError::Validation { field, message }) => {
                assert_eq!(field, "password");
                assert_eq!(message, "Password must be at least 8 characters");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
