//! One-way credential encoding and random secrets.

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand_core::RngCore;

const GENERATED_PASSWORD_LEN: usize = 12;
const TOKEN_BYTES: usize = 32;

/// Hash `password` with Argon2id and a fresh random salt.
///
/// # Errors
///
/// Returns an error if the hasher rejects the input.
pub fn encode(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Check `password` against a stored credential.
///
/// Accepts both the PHC string and the legacy form, which is the PHC string
/// hex-encoded and padded with NUL bytes.
pub fn matches(password: &str, stored: &str) -> bool {
    let phc = if stored.starts_with('$') {
        stored.to_string()
    } else {
        match decode_legacy(stored) {
            Some(phc) => phc,
            None => return false,
        }
    };
    match PasswordHash::new(&phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn decode_legacy(stored: &str) -> Option<String> {
    if stored.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(stored.len() / 2);
    for pair in stored.as_bytes().chunks(2) {
        let hex = std::str::from_utf8(pair).ok()?;
        bytes.push(u8::from_str_radix(hex, 16).ok()?);
    }
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8(bytes).ok()
}

/// A random alphanumeric password for accounts registered without one
/// and for password resets.
pub fn generate_password() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// An unguessable single-use email verification token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_random_password() {
        let password = generate_password();
        let key = encode(&password).unwrap();
        assert!(matches(&password, &key));
    }

    #[test]
    fn changed_password_does_not_match() {
        let key = encode(&generate_password()).unwrap();
        assert!(!matches("something else", &key));
    }

    #[test]
    fn salts_differ_per_call() {
        assert_ne!(encode("secret").unwrap(), encode("secret").unwrap());
    }

    #[test]
    fn verify_legacy_hex_credential() {
        let key = "246172676F6E32696424763D3139246D3D36353533362C743D322C703D3124564A50666459365174574B786B6361745A2B37443241246D71324959726138695A564A6D5A2F2B53777A376868672B7659744341484861667A796A7469664A70426300000000000000000000000000000000000000000000000000000000000000";
        assert!(matches("y89zFqkL6hro", key));
        assert!(!matches("y89zFqkL6hrx", key));
    }

    #[test]
    fn garbage_credential_never_matches() {
        assert!(!matches("secret", "not a hash"));
        assert!(!matches("secret", ""));
    }

    #[test]
    fn generated_secrets_have_expected_shape() {
        let password = generate_password();
        assert_eq!(password.len(), 12);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));

        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert_ne!(token, generate_token());
    }
}
