// file: src/security/password.rs
// version: 1.0.0
// guid: 8b1e4d2c-5a7f-4c93-b0d6-2e9f1a3c7d58

//! Random password and secret generation from the OS entropy source.
//!
//! There is deliberately no weak fallback: if the OS source fails, generation
//! fails with a security error and the caller decides what to do.

use crate::error::SetupError;
use crate::Result;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::error;

/// Generate a password of `length` symbols drawn uniformly from `charset`
pub fn generate_password(length: usize, charset: &str) -> Result<String> {
    generate_password_with(&mut OsRng, length, charset)
}

/// Generate a password using the given random source
pub fn generate_password_with<R: RngCore>(
    rng: &mut R,
    length: usize,
    charset: &str,
) -> Result<String> {
    let symbols = validate_charset(charset)?;
    if length == 0 {
        return Err(SetupError::invalid_argument(
            "Password length must be at least 1",
        ));
    }

    // Bytes at or above `limit` would bias the modulo and are rejected
    let n = symbols.len();
    let limit = 256 - (256 % n);
    let mut password = String::with_capacity(length);
    let mut buf = [0u8; 64];

    while password.len() < length {
        rng.try_fill_bytes(&mut buf).map_err(|e| {
            error!("Secure entropy source unavailable: {}", e);
            SetupError::security(format!("Secure entropy source unavailable: {}", e))
        })?;

        for &byte in &buf {
            if (byte as usize) < limit {
                password.push(symbols[byte as usize % n] as char);
                if password.len() == length {
                    break;
                }
            }
        }
    }

    Ok(password)
}

fn validate_charset(charset: &str) -> Result<Vec<u8>> {
    if charset.is_empty() {
        return Err(SetupError::invalid_argument("Character set cannot be empty"));
    }
    if !charset.chars().all(|c| c.is_ascii_graphic()) {
        return Err(SetupError::invalid_argument(
            "Character set must contain printable ASCII only",
        ));
    }

    let bytes = charset.as_bytes().to_vec();
    let mut seen = [false; 128];
    for &b in &bytes {
        if seen[b as usize] {
            return Err(SetupError::invalid_argument(format!(
                "Character set contains duplicate symbol '{}'",
                b as char
            )));
        }
        seen[b as usize] = true;
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::DEFAULT_PASSWORD_CHARSET;

    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no entropy device",
            )))
        }
    }

    #[test]
    fn test_length_and_charset() {
        let password = generate_password(16, DEFAULT_PASSWORD_CHARSET).unwrap();
        assert_eq!(password.len(), 16);
        assert!(password.chars().all(|c| DEFAULT_PASSWORD_CHARSET.contains(c)));
    }

    #[test]
    fn test_successive_calls_differ() {
        let a = generate_password(16, DEFAULT_PASSWORD_CHARSET).unwrap();
        let b = generate_password(16, DEFAULT_PASSWORD_CHARSET).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_restricted_charset() {
        let password = generate_password(200, "ab").unwrap();
        assert_eq!(password.len(), 200);
        assert!(password.chars().all(|c| c == 'a' || c == 'b'));
        assert!(password.contains('a') && password.contains('b'));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(generate_password(0, "abc").is_err());
        assert!(generate_password(8, "").is_err());
        assert!(generate_password(8, "aab").is_err());
        assert!(generate_password(8, "ab c").is_err());
    }

    #[test]
    fn test_broken_entropy_source_fails_loudly() {
        let result = generate_password_with(&mut BrokenRng, 16, "abc");
        assert!(matches!(result, Err(SetupError::Security(_))));
    }
}
