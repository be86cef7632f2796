//! Random hex secret generation.

use uuid::Uuid;

/// Generate `bytes` bytes of randomness as a lowercase hex string.
///
/// Drawn from v4 UUIDs, which source the OS RNG. Used for one-shot install
/// secrets (database passwords, session key material).
pub fn random_hex(bytes: usize) -> String {
    let mut out = String::with_capacity(bytes * 2);
    while out.len() < bytes * 2 {
        out.push_str(&Uuid::new_v4().simple().to_string());
    }
    out.truncate(bytes * 2);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_has_requested_length() {
        assert_eq!(random_hex(16).len(), 32);
        assert_eq!(random_hex(64).len(), 128);
    }

    #[test]
    fn random_hex_is_hex() {
        assert!(random_hex(64).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn random_hex_differs_between_calls() {
        assert_ne!(random_hex(16), random_hex(16));
    }
}
