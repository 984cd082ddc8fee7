use crate::index::SearchIndex;
use crate::snippet::snippet_for;
use crate::tokenizer::{split_terms, tokenize};
use crate::{DocId, ForwardEntry};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::ops::{Bound, ControlFlow};
use std::time::Instant;
use time::OffsetDateTime;

const TITLE_BOOST: f64 = 2.0;
const TAG_BOOST: f64 = 1.5;
const RELATED_TERMS: usize = 5;
const FIELD_CLAUSE_SCORE: f64 = 1.0;

lazy_static! {
    static ref FIELD_CLAUSE: Regex = Regex::new(r"^(\w+):(.+)$").expect("valid regex");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Date,
    Title,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    #[serde(rename = "type")]
    pub artifact_type: Option<String>,
    pub language: Option<String>,
    /// Matches when any of the listed tags is present.
    pub tags: Vec<String>,
}

impl SearchFilters {
    fn accepts(&self, entry: &ForwardEntry) -> bool {
        if let Some(t) = &self.artifact_type {
            if &entry.artifact_type != t {
                return false;
            }
        }
        if let Some(lang) = &self.language {
            if entry.language.as_ref() != Some(lang) {
                return false;
            }
        }
        self.tags.is_empty() || self.tags.iter().any(|t| entry.tags.contains(t))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchOptions {
    pub limit: usize,
    pub offset: usize,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub filters: SearchFilters,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { limit: 20, offset: 0, sort_by: SortBy::default(), sort_order: SortOrder::default(), filters: SearchFilters::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FuzzyOptions {
    pub max_distance: usize,
    pub min_similarity: f64,
    #[serde(flatten)]
    pub search: SearchOptions,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self { max_distance: 2, min_similarity: 0.6, search: SearchOptions::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: DocId,
    pub score: f64,
    pub title: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub language: Option<String>,
    pub tags: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub matched_terms: Vec<String>,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total_results: usize,
    pub has_more: bool,
    /// Related terms co-occurring in the matched artifacts.
    pub suggestions: Vec<String>,
    pub took_ms: u64,
}

#[derive(Debug, Clone, Default)]
struct Scored {
    score: f64,
    matched: BTreeSet<String>,
}

type ScoreMap = BTreeMap<DocId, Scored>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Field { field: String, value: String },
    Terms(String),
}

impl SearchIndex {
    /// Exact-term search with TF-IDF scoring, title/tag boosts, filters, sorting and paging.
    pub fn search(&self, query: &str, options: &SearchOptions) -> SearchResults {
        let start = Instant::now();
        let terms = query_terms(query);
        let scores = self.score_terms(&terms, &options.filters);
        self.finish(query, &terms, scores, options, start)
    }

    /// Boolean search over `A AND B`, `A OR B` and `field:value` clauses.
    ///
    /// A single operator applies to the whole query; when both appear, `AND` wins and
    /// the `OR` text is treated as plain terms. Unknown fields match nothing.
    pub fn advanced_search(&self, query: &str, options: &SearchOptions) -> SearchResults {
        let start = Instant::now();
        let (operator, clauses) = parse_advanced(query);

        let mut combined: Option<ScoreMap> = None;
        let mut terms = Vec::new();
        for clause in &clauses {
            let matches = match clause {
                Clause::Field { field, value } => self.match_field(field, value, &options.filters),
                Clause::Terms(text) => {
                    let clause_terms = query_terms(text);
                    let scores = self.score_terms(&clause_terms, &options.filters);
                    terms.extend(clause_terms);
                    scores
                }
            };
            combined = Some(match combined {
                None => matches,
                Some(acc) => merge(acc, matches, operator),
            });
        }
        let terms = dedup(terms);
        self.finish(query, &terms, combined.unwrap_or_default(), options, start)
    }

    /// Typo-tolerant search: every vocabulary term within `max_distance` edits and at
    /// least `min_similarity` similar to a query term contributes `similarity * relevance`.
    ///
    /// This scans the whole vocabulary per query term.
    pub fn fuzzy_search(&self, query: &str, options: &FuzzyOptions) -> SearchResults {
        match self.fuzzy_search_with(query, options, || ControlFlow::<Infallible>::Continue(())) {
            ControlFlow::Continue(results) => results,
            ControlFlow::Break(never) => match never {},
        }
    }

    /// Fuzzy search calling `step` before each vocabulary comparison. A `Break`
    /// from `step` abandons the scan and is handed back unchanged.
    pub fn fuzzy_search_with<B, F>(&self, query: &str, options: &FuzzyOptions, mut step: F) -> ControlFlow<B, SearchResults>
    where
        F: FnMut() -> ControlFlow<B>,
    {
        let start = Instant::now();
        let terms = query_terms(query);
        let total_docs = self.forward.len();
        let mut scores = ScoreMap::new();
        let mut matched_vocab = Vec::new();

        for term in &terms {
            for (candidate, postings) in &self.inverted {
                if let ControlFlow::Break(stop) = step() {
                    return ControlFlow::Break(stop);
                }
                let Some(similarity) = fuzzy_similarity(term, candidate, options.max_distance) else {
                    continue;
                };
                if similarity < options.min_similarity {
                    continue;
                }
                matched_vocab.push(candidate.clone());
                for id in postings {
                    let Some(entry) = self.forward.get(id) else { continue };
                    if !options.search.filters.accepts(entry) {
                        continue;
                    }
                    let relevance = term_relevance(candidate, entry, total_docs, postings.len());
                    let scored = scores.entry(id.clone()).or_default();
                    scored.score += similarity * relevance;
                    scored.matched.insert(candidate.clone());
                }
            }
        }
        let terms = dedup(matched_vocab);
        ControlFlow::Continue(self.finish(query, &terms, scores, &options.search, start))
    }

    /// Autocomplete: vocabulary terms that strictly extend a query term, most common first.
    pub fn suggestions(&self, query: &str, limit: usize) -> Vec<String> {
        let mut candidates: BTreeMap<&str, usize> = BTreeMap::new();
        for prefix in split_terms(query) {
            for (term, postings) in self.inverted.range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded)) {
                if !term.starts_with(prefix.as_str()) {
                    break;
                }
                if term != &prefix {
                    candidates.insert(term.as_str(), postings.len());
                }
            }
        }
        let mut ranked: Vec<(&str, usize)> = candidates.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(limit).map(|(t, _)| t.to_string()).collect()
    }

    fn score_terms(&self, terms: &[String], filters: &SearchFilters) -> ScoreMap {
        let total_docs = self.forward.len();
        let mut scores = ScoreMap::new();
        for term in terms {
            let Some(postings) = self.inverted.get(term) else { continue };
            for id in postings {
                let Some(entry) = self.forward.get(id) else { continue };
                if !filters.accepts(entry) {
                    continue;
                }
                let scored = scores.entry(id.clone()).or_default();
                scored.score += term_relevance(term, entry, total_docs, postings.len());
                scored.matched.insert(term.clone());
            }
        }
        scores
    }

    fn match_field(&self, field: &str, value: &str, filters: &SearchFilters) -> ScoreMap {
        let needle = value.trim().to_lowercase();
        let mut scores = ScoreMap::new();
        if needle.is_empty() {
            return scores;
        }
        for (id, entry) in &self.forward {
            if !filters.accepts(entry) {
                continue;
            }
            let hit = match field {
                "title" => entry.title.to_lowercase().contains(&needle),
                "type" => entry.artifact_type.to_lowercase().contains(&needle),
                "language" => entry.language.as_ref().is_some_and(|l| l.to_lowercase().contains(&needle)),
                "tags" => entry.tags.iter().any(|t| t.to_lowercase().contains(&needle)),
                _ => false,
            };
            if hit {
                scores.insert(id.clone(), Scored { score: FIELD_CLAUSE_SCORE, matched: BTreeSet::new() });
            }
        }
        scores
    }

    fn finish(&self, query: &str, terms: &[String], scores: ScoreMap, options: &SearchOptions, start: Instant) -> SearchResults {
        let suggestions = self.related_terms(terms, scores.keys());

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .filter_map(|(id, scored)| {
                let entry = self.forward.get(&id)?;
                Some(SearchHit {
                    id,
                    score: scored.score,
                    title: entry.title.clone(),
                    artifact_type: entry.artifact_type.clone(),
                    language: entry.language.clone(),
                    tags: entry.tags.clone(),
                    created_at: entry.created_at,
                    updated_at: entry.updated_at,
                    matched_terms: scored.matched.into_iter().collect(),
                    snippet: None,
                })
            })
            .collect();
        sort_hits(&mut hits, options.sort_by, options.sort_order);

        let total_results = hits.len();
        let has_more = options.offset.saturating_add(options.limit) < total_results;
        let mut results: Vec<SearchHit> = hits.into_iter().skip(options.offset).take(options.limit).collect();
        for hit in &mut results {
            if let Some(artifact) = self.artifacts.get(&hit.id) {
                let highlight = if hit.matched_terms.is_empty() { terms } else { &hit.matched_terms[..] };
                hit.snippet = snippet_for(&artifact.content, highlight);
            }
        }

        SearchResults {
            query: query.to_string(),
            results,
            total_results,
            has_more,
            suggestions,
            took_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn related_terms<'a>(&self, terms: &[String], matched: impl Iterator<Item = &'a DocId>) -> Vec<String> {
        let mut related: BTreeMap<&str, usize> = BTreeMap::new();
        for id in matched {
            let Some(entry) = self.forward.get(id) else { continue };
            for token in &entry.tokens {
                if terms.contains(token) || related.contains_key(token.as_str()) {
                    continue;
                }
                let df = self.inverted.get(token).map_or(0, BTreeSet::len);
                related.insert(token.as_str(), df);
            }
        }
        let mut ranked: Vec<(&str, usize)> = related.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(RELATED_TERMS).map(|(t, _)| t.to_string()).collect()
    }
}

/// `tf * idf` for one term in one entry, plus the flat title and tag boosts.
fn term_relevance(term: &str, entry: &ForwardEntry, total_docs: usize, doc_freq: usize) -> f64 {
    let mut score = 0.0;
    if !entry.tokens.is_empty() && doc_freq > 0 {
        let tf = entry.term_count(term) as f64 / entry.tokens.len() as f64;
        let idf = (total_docs as f64 / doc_freq as f64).ln();
        score += tf * idf;
    }
    if entry.title.to_lowercase().contains(term) {
        score += TITLE_BOOST;
    }
    if entry.tags.iter().any(|t| t.to_lowercase().contains(term)) {
        score += TAG_BOOST;
    }
    score
}

fn query_terms(query: &str) -> Vec<String> {
    dedup(tokenize(query))
}

fn dedup(terms: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    terms.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

fn parse_advanced(query: &str) -> (Operator, Vec<Clause>) {
    let (operator, parts): (Operator, Vec<&str>) = if query.contains(" AND ") {
        (Operator::And, query.split(" AND ").collect())
    } else if query.contains(" OR ") {
        (Operator::Or, query.split(" OR ").collect())
    } else {
        (Operator::Or, vec![query])
    };
    let clauses = parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|part| match FIELD_CLAUSE.captures(part) {
            Some(caps) => Clause::Field { field: caps[1].to_lowercase(), value: caps[2].to_string() },
            None => Clause::Terms(part.to_string()),
        })
        .collect();
    (operator, clauses)
}

fn merge(mut acc: ScoreMap, other: ScoreMap, operator: Operator) -> ScoreMap {
    match operator {
        Operator::And => {
            acc.retain(|id, _| other.contains_key(id));
            acc
        }
        Operator::Or => {
            for (id, scored) in other {
                let entry = acc.entry(id).or_default();
                entry.score += scored.score;
                entry.matched.extend(scored.matched);
            }
            acc
        }
    }
}

fn sort_hits(hits: &mut [SearchHit], by: SortBy, order: SortOrder) {
    hits.sort_by(|a, b| {
        let ord = match by {
            SortBy::Relevance => a.score.total_cmp(&b.score),
            SortBy::Date => a.created_at.cmp(&b.created_at),
            SortBy::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        };
        let ord = match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };
        ord.then_with(|| a.id.cmp(&b.id))
    });
}

/// Similarity `1 - d / max_len` when the edit distance `d` is within `max_distance`.
fn fuzzy_similarity(a: &str, b: &str, max_distance: usize) -> Option<f64> {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a.abs_diff(len_b) > max_distance {
        return None;
    }
    let distance = levenshtein_distance(a, b);
    if distance > max_distance {
        return None;
    }
    let longest = len_a.max(len_b);
    if longest == 0 {
        return Some(1.0);
    }
    Some(1.0 - distance as f64 / longest as f64)
}

pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() { return b.len(); }
    if b.is_empty() { return a.len(); }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
