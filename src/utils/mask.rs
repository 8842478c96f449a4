/// Shortest secret that is shown with a prefix and suffix; anything shorter
/// collapses to `****` so that at most eight characters of a key leak.
const MIN_REVEAL_LEN: usize = 12;

/// Renders a secret for display: `abcd...wxyz`, or `****` for short values.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.trim().chars().collect();
    if chars.len() < MIN_REVEAL_LEN {
        return "****".to_string();
    }

    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_prefix_and_suffix() {
        assert_eq!(mask_secret("sk-1234567890abcdef"), "sk-1...cdef");
    }

    #[test]
    fn short_secrets_are_fully_hidden() {
        assert_eq!(mask_secret("abc"), "****");
        assert_eq!(mask_secret("12345678901"), "****");
    }
}
