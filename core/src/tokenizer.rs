use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

pub type StopWords = HashSet<String>;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").expect("valid regex");
    static ref NON_WORD_RE: Regex = Regex::new(r"[^\w\s]").expect("valid regex");
    static ref SPACE_RE: Regex = Regex::new(r"\s+").expect("valid regex");
    static ref STOPWORDS: Vec<&'static str> = vec![
        "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for",
        "of", "with", "by", "is", "are", "was", "were", "be", "been", "being",
        "have", "has", "had", "do", "does", "did", "will", "would", "shall",
        "should", "may", "might", "must", "can", "could", "i", "you", "he",
        "she", "it", "we", "they", "me", "him", "her", "us", "them", "this",
        "that", "these", "those", "am",
    ];
}

pub fn default_stop_words() -> StopWords {
    STOPWORDS.iter().map(|w| w.to_string()).collect()
}

/// Strip tags, replace punctuation with spaces, collapse whitespace and lowercase.
pub fn clean_text(text: &str) -> String {
    let text = TAG_RE.replace_all(text, " ");
    let text = NON_WORD_RE.replace_all(&text, " ");
    let text = SPACE_RE.replace_all(&text, " ");
    text.trim().to_lowercase()
}

/// Tokenize text into normalized terms with stop words removed. No stemming.
pub fn tokenize(text: &str, stop_words: &StopWords) -> Vec<String> {
    clean_text(text)
        .split_whitespace()
        .filter(|token| !stop_words.contains(*token))
        .map(str::to_string)
        .collect()
}

/// Like [`tokenize`], pairing each term with its zero-based position in the filtered sequence.
pub fn tokenize_positions(text: &str, stop_words: &StopWords) -> Vec<(String, usize)> {
    tokenize(text, stop_words).into_iter().enumerate().map(|(pos, term)| (term, pos)).collect()
}
