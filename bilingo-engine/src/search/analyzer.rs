//! Text analysis shared by the index and the store scan fallback

/// Lowercased alphanumeric word tokens, in order of appearance
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Edge n-grams of a single token: every prefix of `min..=max` characters
///
/// Tokens shorter than `min` yield nothing; tokens longer than `max` only
/// contribute their prefixes up to `max`.
pub fn edge_ngrams(token: &str, min: usize, max: usize) -> Vec<String> {
    let chars: Vec<char> = token.chars().collect();
    let upper = chars.len().min(max);
    (min..=upper)
        .map(|n| chars[..n].iter().collect())
        .collect()
}

/// Grams a document must contain for a phrase to appear in it
///
/// Takes the phrase as typed and tokenizes it exactly like document text.
/// The first phrase token may start in the middle of a document word, so it
/// is not usable as a prefix. Every later token starts at a word boundary.
pub fn phrase_grams(phrase: &str, min: usize, max: usize) -> Vec<String> {
    let mut grams: Vec<String> = tokenize(phrase)
        .iter()
        .skip(1)
        .filter(|t| t.chars().count() >= min)
        .filter_map(|t| edge_ngrams(t, min, max).pop())
        .collect();
    grams.sort();
    grams.dedup();
    grams
}

/// Case-insensitive literal substring test
pub fn contains_phrase(haystack: &str, phrase_lower: &str) -> bool {
    haystack.to_lowercase().contains(phrase_lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_and_lowercases() {
        assert_eq!(tokenize("Hello, World! it's"), vec!["hello", "world", "it", "s"]);
        assert!(tokenize("  ... ").is_empty());
    }

    #[test]
    fn test_tokenize_keeps_non_ascii_letters() {
        assert_eq!(tokenize("Привет мир"), vec!["привет", "мир"]);
    }

    #[test]
    fn test_edge_ngrams_bounds() {
        assert_eq!(edge_ngrams("hello", 3, 20), vec!["hel", "hell", "hello"]);
        assert!(edge_ngrams("hi", 3, 20).is_empty());
        assert_eq!(edge_ngrams("abcdef", 3, 4), vec!["abc", "abcd"]);
    }

    #[test]
    fn test_phrase_grams_skip_first_token() {
        assert_eq!(phrase_grams("lo world", 3, 20), vec!["world"]);
        assert!(phrase_grams("hello", 3, 20).is_empty());
        assert!(phrase_grams("hello to", 3, 20).is_empty());
    }

    #[test]
    fn test_phrase_grams_follow_document_tokens() {
        // Lowercase 'İ' gains a combining dot, which is not alphanumeric
        let doc_token = tokenize("İstanbul").pop().unwrap();
        assert_eq!(phrase_grams("to İstanbul", 3, 20), vec![doc_token]);
    }

    #[test]
    fn test_contains_phrase_ignores_case() {
        assert!(contains_phrase("Say Hello World now", "hello world"));
        assert!(!contains_phrase("world hello", "hello world"));
    }
}
