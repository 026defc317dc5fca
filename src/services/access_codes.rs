use rand::Rng;
use sha2::{Digest, Sha256};

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const GENERATED_LENGTH: usize = 8;

/// Random code without look-alike characters (no I, O, 0, 1).
pub(crate) fn generate_access_code() -> String {
    let mut rng = rand::thread_rng();
    (0..GENERATED_LENGTH).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

/// Codes are compared case-insensitively and without surrounding whitespace.
pub(crate) fn hash_access_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.trim().to_uppercase().as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn matches(stored_hash: Option<&str>, supplied: Option<&str>) -> bool {
    match (stored_hash, supplied) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(hash), Some(code)) => hash_access_code(code) == hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_use_the_safe_alphabet() {
        let code = generate_access_code();
        assert_eq!(code.len(), GENERATED_LENGTH);
        assert!(code.bytes().all(|byte| ALPHABET.contains(&byte)));
    }

    #[test]
    fn hash_ignores_case_and_padding() {
        assert_eq!(hash_access_code("abc123"), hash_access_code("  ABC123 "));
        assert_eq!(hash_access_code("x").len(), 64);
    }

    #[test]
    fn missing_code_only_passes_open_assignments() {
        let hash = hash_access_code("QUIZ42");
        assert!(matches(None, None));
        assert!(matches(None, Some("anything")));
        assert!(!matches(Some(&hash), None));
        assert!(!matches(Some(&hash), Some("QUIZ41")));
        assert!(matches(Some(&hash), Some("quiz42")));
    }
}
