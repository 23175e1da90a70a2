//! Query tokenizer shared by recall and the duplicate-detection check.

use once_cell::sync::Lazy;
use regex::Regex;

const MAX_TOKENS: usize = 10;
const MIN_TOKEN_LEN: usize = 3;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]+").unwrap());

/// Lowercase, split on non-word characters, drop tokens shorter than 3
/// chars, cap to 10 tokens (spec.md §4.3 step 1).
pub fn tokenize(query: &str) -> Vec<String> {
    NON_WORD
        .split(&query.to_lowercase())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .take(MAX_TOKENS)
        .map(|t| t.to_string())
        .collect()
}

/// Builds a disjunctive FTS5 MATCH expression from tokens, e.g. `a OR b`.
/// FTS5 special characters in user input are neutralized by quoting each
/// token.
pub fn fts_match_expr(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_short_tokens_and_caps_length() {
        let tokens = tokenize("Go to the store and buy eggs, milk, bread, cheese, butter, flour, sugar");
        assert!(tokens.len() <= MAX_TOKENS);
        assert!(tokens.iter().all(|t| t.len() >= MIN_TOKEN_LEN));
    }

    #[test]
    fn empty_on_all_short_tokens() {
        assert!(tokenize("a an is").is_empty());
    }
}
