use sha2::{Sha256, Digest};

/// Computes a SHA-256 hash over the given strings, hex encoded.
/// Used for ids that must be stable across restarts (serial devices, migrated
/// applications).
pub fn gen_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(gen_hash(&["/test/socket1"]), gen_hash(&["/test/socket1"]));
        assert_ne!(gen_hash(&["/test/socket1"]), gen_hash(&["/test/socket2"]));
    }

    #[test]
    fn test_hash_known_value() {
        assert_eq!(
            gen_hash(&["abc"]),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(gen_hash(&["a", "bc"]), gen_hash(&["abc"]));
    }
}
