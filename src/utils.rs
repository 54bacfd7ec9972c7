//! Small parsing helpers for environment-provided settings.

use std::collections::HashSet;

/// Parse a chat-id list from an environment variable. Accepts commas,
/// semicolons or whitespace as separators; unparseable tokens are dropped.
#[must_use]
pub fn parse_chat_id_list(raw: &str) -> HashSet<i64> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .filter_map(|id| id.parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_separators() {
        let ids = parse_chat_id_list("-100; -200, -300 -400");
        assert_eq!(ids.len(), 4);
        assert!(ids.contains(&-100));
        assert!(ids.contains(&-400));
    }

    #[test]
    fn drops_garbage_tokens() {
        let ids = parse_chat_id_list("abc, -777,,");
        assert_eq!(ids, HashSet::from([-777]));
    }

    #[test]
    fn empty_input_is_empty_set() {
        assert!(parse_chat_id_list("").is_empty());
        assert!(parse_chat_id_list("  ").is_empty());
    }
}
