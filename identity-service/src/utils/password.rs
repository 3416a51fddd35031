use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

/// Plaintext password. `Debug` is redacted so it cannot reach a log line.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_valid_length(&self) -> bool {
        let len = self.0.chars().count();
        (PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len)
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id with default parameters and a random salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<(), anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .map_err(|_| anyhow::anyhow!("Password verification failed"))
}

/// Hash on the blocking pool; Argon2 is deliberately slow.
pub async fn hash_password_async(password: Password) -> Result<PasswordHashString, anyhow::Error> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))?
}

pub async fn verify_password_async(
    password: Password,
    password_hash: PasswordHashString,
) -> Result<(), anyhow::Error> {
    tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = Password::new("correct horse battery".to_string());
        let hash = hash_password(&password).expect("hash");

        assert!(hash.as_str().starts_with("$argon2id"));
        assert!(verify_password(&password, &hash).is_ok());
        assert!(verify_password(&Password::new("wrong".to_string()), &hash).is_err());
    }

    #[test]
    fn test_salted_hashes_differ() {
        let password = Password::new("correct horse battery".to_string());
        let a = hash_password(&password).unwrap();
        let b = hash_password(&password).unwrap();
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_length_bounds() {
        assert!(!Password::new("a".repeat(7)).has_valid_length());
        assert!(Password::new("a".repeat(8)).has_valid_length());
        assert!(Password::new("a".repeat(128)).has_valid_length());
        assert!(!Password::new("a".repeat(129)).has_valid_length());
    }

    #[test]
    fn test_debug_is_redacted() {
        let rendered = format!("{:?}", Password::new("hunter2hunter2".to_string()));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_async_helpers() {
        let hash = hash_password_async(Password::new("correct horse battery".to_string()))
            .await
            .unwrap();
        assert!(
            verify_password_async(Password::new("correct horse battery".to_string()), hash)
                .await
                .is_ok()
        );
    }
}
