//! # CSRF Protection
//!
//! Double-submit token: `GET /api/csrf-token` mints a random value returned
//! both as a cookie and in the body; state-changing requests must echo it in
//! the `X-CSRF-Token` header, and the middleware compares header and cookie.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "X-CSRF-Token";

pub fn mint_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Constant-time equality so the comparison leaks nothing about the token.
pub fn tokens_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() || a.is_empty() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_are_unique_and_urlsafe() {
        let a = mint_token();
        let b = mint_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn matching_is_exact() {
        let token = mint_token();
        assert!(tokens_match(&token, &token.clone()));
        assert!(!tokens_match(&token, &mint_token()));
        assert!(!tokens_match(&token, ""));
        assert!(!tokens_match("", ""));
    }
}
