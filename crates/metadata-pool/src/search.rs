//! Search query tokenization.

/// Characters that make a search token unusable.
const INVALID_TOKEN_CHARS: &[char] = &['<', '>', '(', ')'];

/// Splits a user query into search tokens.
///
/// Words on the greylist are dropped unless that would leave nothing, in
/// which case the original words are kept. Returns `None` when no usable
/// token remains; callers treat that as "match everything".
pub fn build_search_tokens(query: &str, greylist: &[String]) -> Option<Vec<String>> {
    let folded = query.trim().to_lowercase();
    let words: Vec<&str> = folded.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    let kept: Vec<&str> = words
        .iter()
        .copied()
        .filter(|word| !greylist.iter().any(|grey| grey == word))
        .collect();
    let words = if kept.is_empty() { words } else { kept };

    let tokens: Vec<String> = words
        .into_iter()
        .filter(|word| is_valid_token(word))
        .map(str::to_string)
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens)
    }
}

fn is_valid_token(token: &str) -> bool {
    token.chars().count() > 1 && !token.contains(INVALID_TOKEN_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SEARCH_GREYLIST;

    fn greylist() -> Vec<String> {
        DEFAULT_SEARCH_GREYLIST.split(';').map(str::to_string).collect()
    }

    #[test]
    fn greylisted_words_are_removed() {
        assert_eq!(
            build_search_tokens("Image Editor APP", &greylist()),
            Some(vec!["image".to_string(), "editor".to_string()])
        );
    }

    #[test]
    fn all_greylisted_keeps_original_words() {
        assert_eq!(
            build_search_tokens("app tool", &greylist()),
            Some(vec!["app".to_string(), "tool".to_string()])
        );
    }

    #[test]
    fn short_or_invalid_queries_match_everything() {
        assert_eq!(build_search_tokens("a", &greylist()), None);
        assert_eq!(build_search_tokens("   ", &greylist()), None);
        assert_eq!(build_search_tokens("(x) <b>", &greylist()), None);
        assert_eq!(
            build_search_tokens("a gimp", &greylist()),
            Some(vec!["gimp".to_string()])
        );
    }
}
