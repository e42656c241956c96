//! Single-purpose LLM-backed operations composed by the pipelines.
//!
//! Every tool has the same shape: inputs, one adapter call under a fixed
//! capability, optional JSON or markdown extraction, typed result.

pub mod news;
pub mod post;
pub mod sources;

/// Prefix of `s` holding at most `max` characters (never splits a char).
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::truncate_chars;

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
