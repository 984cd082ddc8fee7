use regex::{Regex, RegexBuilder};

const BEFORE: usize = 100;
const AFTER: usize = 200;

/// Extract a window of `content` around the first match of any term, with every
/// match wrapped in `<em>`. Falls back to the leading characters when nothing matches.
pub fn snippet_for(content: &str, terms: &[String]) -> Option<String> {
    if content.is_empty() { return None; }
    let pattern = terms_pattern(terms);
    let first = pattern.as_ref().and_then(|re| re.find(content)).map(|m| m.start());
    let snippet = match first {
        Some(idx) => {
            let start = floor_char_boundary(content, idx.saturating_sub(BEFORE));
            let end = floor_char_boundary(content, (idx + AFTER).min(content.len()));
            &content[start..end]
        }
        None => {
            let end = content.char_indices().nth(AFTER).map_or(content.len(), |(i, _)| i);
            &content[..end]
        }
    };
    Some(match &pattern {
        Some(re) => highlight(snippet, re),
        None => snippet.to_string(),
    })
}

fn terms_pattern(terms: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| regex::escape(t))
        .collect();
    if alternatives.is_empty() { return None; }
    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .ok()
}

fn highlight(snippet: &str, re: &Regex) -> String {
    re.replace_all(snippet, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
