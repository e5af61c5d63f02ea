//! Opaque session token generation

use rand::Rng;

/// Session token prefix
const TOKEN_PREFIX: &str = "elyon";

/// Generate a new session token
/// Format: elyon_<user_prefix>_<random_32chars>
pub fn generate_session_token(user_id: &str) -> String {
    // char_indices keeps the cut on a char boundary for non-ASCII ids
    let user_prefix: String = match user_id.char_indices().nth(6) {
        Some((byte_idx, _)) => user_id[..byte_idx].to_string(),
        None => user_id.to_string(),
    };
    // '_' is the field separator
    let user_prefix = user_prefix.replace('_', "-");

    let random_part: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();

    format!("{}_{}_{}", TOKEN_PREFIX, user_prefix, random_part)
}

/// Validate session token format
pub fn validate_token_format(token: &str) -> bool {
    let parts: Vec<&str> = token.split('_').collect();
    parts.len() == 3 && parts[0] == TOKEN_PREFIX && parts[2].len() >= 32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_session_token() {
        let token = generate_session_token("user123456");
        assert!(token.starts_with("elyon_user12_"));
        assert!(validate_token_format(&token));
    }

    #[test]
    fn test_short_and_non_ascii_ids() {
        assert!(generate_session_token("ada").starts_with("elyon_ada_"));
        let token = generate_session_token("ÉlodieMartin");
        assert!(token.starts_with("elyon_Élodie_"));
        assert!(validate_token_format(&token));
    }

    #[test]
    fn test_underscore_in_user_id() {
        let token = generate_session_token("a_b_c");
        assert!(token.starts_with("elyon_a-b-c_"));
        assert!(validate_token_format(&token));
    }

    #[test]
    fn test_validate_token_format() {
        assert!(validate_token_format(
            "elyon_user12_a1b2c3d4e5f6g7h8i9j0k1l2m3n4o5p6"
        ));
        assert!(!validate_token_format("invalid_token"));
        assert!(!validate_token_format("elyon_short_abc"));
    }
}
