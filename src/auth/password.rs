use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordConfig;
use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 12;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Argon2id hashing with configurable cost.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    // burned on unknown emails so both login paths cost the same
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(config: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {}", e))?;
        let mut hasher = Self {
            params,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash("hireqimah-dummy-password")?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Cost parameters are read from the stored hash.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    pub fn verify_dummy(&self, plain: &str) {
        let _ = self.verify(plain, &self.dummy_hash);
    }
}

/// Registration policy: 12+ chars with upper, lower, digit and special.
pub fn validate_password_strength(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::WeakPassword(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::invalid(format!(
            "Password must be at most {} characters.",
            MAX_PASSWORD_LEN
        )));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(AppError::WeakPassword("Password must include an uppercase letter.".into()));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(AppError::WeakPassword("Password must include a lowercase letter.".into()));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::WeakPassword("Password must include a number.".into()));
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(AppError::WeakPassword("Password must include a special character.".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, TEST_PASSWORD};

    fn weak_reason(password: &str) -> String {
        match validate_password_strength(password) {
            Err(AppError::WeakPassword(reason)) => reason,
            other => panic!("expected a weak-password rejection, got {:?}", other),
        }
    }

    #[test]
    fn account_password_meets_every_rule() {
        assert!(validate_password_strength(TEST_PASSWORD).is_ok());
        assert!(validate_password_strength("Riyadh#Season2025").is_ok());
    }

    #[test]
    fn each_missing_class_is_named() {
        assert_eq!(weak_reason("Kfupm!23"), "Password must be at least 12 characters.");
        assert_eq!(weak_reason("kfupm!dhahran7"), "Password must include an uppercase letter.");
        assert_eq!(weak_reason("KFUPM!DHAHRAN7"), "Password must include a lowercase letter.");
        assert_eq!(weak_reason("Kfupm!Dhahran!"), "Password must include a number.");
        assert_eq!(weak_reason("KfupmDhahran77"), "Password must include a special character.");
    }

    #[test]
    fn overlong_password_is_invalid_input_not_weak() {
        let long = format!("Aa1!{}", "x".repeat(MAX_PASSWORD_LEN));
        assert!(matches!(validate_password_strength(&long), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn stored_hash_checks_the_account_password() {
        let hasher = PasswordHasher::new(&test_config().password).unwrap();
        let stored = hasher.hash(TEST_PASSWORD).unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(hasher.verify(TEST_PASSWORD, &stored).unwrap());
        assert!(!hasher.verify("Str0ng!Passw0rd", &stored).unwrap());
        assert_ne!(stored, hasher.hash(TEST_PASSWORD).unwrap());
    }

    #[test]
    fn corrupted_hash_is_an_error() {
        let hasher = PasswordHasher::new(&test_config().password).unwrap();
        assert!(hasher.verify(TEST_PASSWORD, "argon2id-but-not-phc").is_err());
    }
}
