use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Newtype for plaintext passwords to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for stored password hashes
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

/// Hash a password using Argon2id with a freshly generated salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash.
///
/// Returns false on mismatch and on any malformed-hash condition; lockout
/// accounting is the caller's responsibility.
pub fn verify_password(password: &Password, password_hash: &PasswordHashString) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(password_hash.as_str()) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .is_ok()
}

/// Validate password strength: minimum length plus at least one uppercase,
/// lowercase, digit, and special character.
pub fn validate_password_strength(password: &str, min_length: usize) -> Result<(), &'static str> {
    if password.len() < min_length {
        return Err("Password is too short");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit");
    }
    if !password
        .chars()
        .any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c))
    {
        return Err("Password must contain at least one special character");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = Password::new("Sup3r$ecret".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2"));
        assert!(verify_password(&password, &hash));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let password = Password::new("Sup3r$ecret".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        let wrong = Password::new("Wr0ng$ecret".to_string());
        assert!(!verify_password(&wrong, &hash));
    }

    #[test]
    fn malformed_hash_is_a_mismatch_not_a_panic() {
        let password = Password::new("Sup3r$ecret".to_string());
        let malformed = PasswordHashString::new("not-a-phc-string".to_string());
        assert!(!verify_password(&password, &malformed));

        let empty = PasswordHashString::new(String::new());
        assert!(!verify_password(&password, &empty));
    }

    #[test]
    fn same_password_hashes_differently() {
        let password = Password::new("Sup3r$ecret".to_string());
        let hash1 = hash_password(&password).unwrap();
        let hash2 = hash_password(&password).unwrap();

        assert_ne!(hash1.as_str(), hash2.as_str());
        assert!(verify_password(&password, &hash1));
        assert!(verify_password(&password, &hash2));
    }

    #[test]
    fn strength_policy_rejects_weak_passwords() {
        assert!(validate_password_strength("Sh0r!t", 8).is_err());
        assert!(validate_password_strength("alllowercase1!", 8).is_err());
        assert!(validate_password_strength("ALLUPPERCASE1!", 8).is_err());
        assert!(validate_password_strength("NoDigitsHere!", 8).is_err());
        assert!(validate_password_strength("NoSpecial123", 8).is_err());
        assert!(validate_password_strength("V4lid$Password", 8).is_ok());
    }

    #[test]
    fn debug_does_not_leak_plaintext() {
        let password = Password::new("Sup3r$ecret".to_string());
        assert_eq!(format!("{:?}", password), "Password(***)");
    }
}
