use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use color_eyre::eyre::eyre;

/// Hash a plaintext password with a per-user random salt.
///
/// The returned string is a self-describing PHC hash, safe to persist.
pub fn hash_password(plain: &str) -> cja::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| eyre!("Failed to hash password: {}", e))?;

    Ok(hash.to_string())
}

/// Check a plaintext password against a stored hash. One-way only; the
/// stored hash is never reversed.
pub fn verify_password(plain: &str, stored_hash: &str) -> cja::Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| eyre!("Stored password hash is malformed: {}", e))?;

    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
