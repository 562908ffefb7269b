//! Authentication: Bearer API-key check for HTTP `/scan*` routes, and the
//! WebSocket shared-secret token check, both of which must run in
//! constant time regardless of where the first mismatched byte falls.

/// Constant-time string comparison. Unlike `hmac::compare_digest`, this
/// does not special-case `None` — callers decide what an absent token
/// means (§4.K: "connection is refused when no token is configured").
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Extracts a bearer token from an `Authorization` header value, accepting
/// either `Bearer <token>` or the raw token for leniency.
pub fn extract_bearer_token(header_value: &str) -> &str {
    match header_value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => header_value.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("secret-token", "secret-token"));
    }

    #[test]
    fn constant_time_eq_rejects_different_length() {
        assert!(!constant_time_eq("short", "much-longer-token"));
    }

    #[test]
    fn constant_time_eq_rejects_different_content_same_length() {
        assert!(!constant_time_eq("aaaaaaaa", "aaaaaaab"));
    }

    #[test]
    fn extract_bearer_token_strips_scheme() {
        assert_eq!(extract_bearer_token("Bearer abc123"), "abc123");
    }

    #[test]
    fn extract_bearer_token_accepts_raw_token() {
        assert_eq!(extract_bearer_token("abc123"), "abc123");
    }
}
