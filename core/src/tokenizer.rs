use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

pub const MIN_TOKEN_LEN: usize = 3;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","after","all","also","an","and","any","are","as","at",
            "be","been","but","by","can","could","did","do","does","for","from",
            "had","has","have","her","his","how","if","in","into","is","it","its",
            "just","may","more","most","not","now","of","on","one","only","or","other","our","out",
            "over","she","should","some","such","than","that","the","their","them","then","there",
            "these","they","this","those","through","too","was","were","what","when","where","which",
            "while","who","will","with","would","you","your"
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Tokenize text for indexing and querying: NFKC + lowercase, split on non-word
/// characters, drop tokens shorter than three characters and stopwords.
///
/// Indexing and query-side tokenization both go through here so terms always line up.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    WORD.find_iter(&normalized)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .filter(|t| !is_stopword(t))
        .map(str::to_string)
        .collect()
}

/// Split raw input into lowercase terms without length or stopword filtering.
/// Used for prefix completion, where the user is usually mid-word.
pub fn split_terms(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    WORD.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
}
