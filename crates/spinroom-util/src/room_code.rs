use rand::Rng;

/// Room-code alphabet with 0/O/1/I/L-style confusables removed, so a
/// code read out loud over voice chat types back in unambiguously.
const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

pub const CODE_LEN: usize = 6;

pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Canonical form used for lookups; codes are case-insensitive.
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
