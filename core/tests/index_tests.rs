use search_core::persist::{load_snapshot, save_snapshot};
use search_core::{Artifact, FuzzyOptions, SearchFilters, SearchIndex, SearchOptions, SortBy, SortOrder};
use tempfile::tempdir;
use time::macros::datetime;

fn fox_and_dog() -> SearchIndex {
    let mut index = SearchIndex::new();
    index.index_document(Artifact::new("1", "the quick brown fox").with_title("Fox")).unwrap();
    index.index_document(Artifact::new("2", "a lazy dog sleeps")).unwrap();
    index
}

fn assert_no_reference(index: &SearchIndex, id: &str) {
    for term in index.vocabulary() {
        let postings = index.postings(term).unwrap();
        assert!(!postings.is_empty(), "empty posting set for {term}");
        assert!(!postings.contains(id), "{id} still listed under {term}");
    }
}

#[test]
fn search_finds_fox_with_title_boost() {
    let index = fox_and_dog();
    let results = index.search("fox", &SearchOptions::default());
    assert_eq!(results.total_results, 1);
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.results[0].id, "1");
    assert_eq!(results.results[0].matched_terms, vec!["fox"]);

    let mut untitled = SearchIndex::new();
    untitled.index_document(Artifact::new("1", "the quick brown fox").with_title("Animal")).unwrap();
    untitled.index_document(Artifact::new("2", "a lazy dog sleeps")).unwrap();
    let plain = untitled.search("fox", &SearchOptions::default());
    assert!(results.results[0].score > plain.results[0].score);
    assert!((results.results[0].score - plain.results[0].score - 2.0).abs() < 1e-9);
}

#[test]
fn tf_idf_score_matches_formula() {
    let index = fox_and_dog();
    let options = SearchOptions::default();
    let hit = &index.search("sleeps", &options).results[0];
    // tokens: lazy, dog, sleeps; idf = ln(2 / 1)
    let expected = (1.0 / 3.0) * 2f64.ln();
    assert!((hit.score - expected).abs() < 1e-9);
}

#[test]
fn tag_boost_applies() {
    let mut index = fox_and_dog();
    index.index_document(Artifact::new("3", "another fox story").with_tags(["fox"])).unwrap();
    let results = index.search("fox", &SearchOptions::default());
    let tagged = results.results.iter().find(|h| h.id == "3").unwrap();
    // tf = 1/3, idf = ln(3/2), tag boost 1.5
    let expected = (1.0 / 3.0) * (3.0f64 / 2.0).ln() + 1.5;
    assert!((tagged.score - expected).abs() < 1e-9);
}

#[test]
fn unknown_term_yields_empty_results() {
    let index = fox_and_dog();
    let results = index.search("nonexistentterm", &SearchOptions::default());
    assert_eq!(results.total_results, 0);
    assert!(results.results.is_empty());
    assert!(!results.has_more);
}

#[test]
fn fuzzy_search_tolerates_typos() {
    let index = fox_and_dog();
    let options = FuzzyOptions { max_distance: 2, ..Default::default() };
    let results = index.fuzzy_search("foxx", &options);
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.results[0].id, "1");
    assert_eq!(results.results[0].matched_terms, vec!["fox"]);
}

#[test]
fn fuzzy_score_is_similarity_times_exact_score() {
    let index = fox_and_dog();
    let exact = index.search("fox", &SearchOptions::default()).results[0].score;
    let fuzzy = index.fuzzy_search("foxx", &FuzzyOptions::default()).results[0].score;
    assert!((fuzzy - 0.75 * exact).abs() < 1e-9);
}

#[test]
fn fuzzy_search_honours_min_similarity() {
    let index = fox_and_dog();
    let options = FuzzyOptions { max_distance: 2, min_similarity: 0.9, ..Default::default() };
    assert!(index.fuzzy_search("foxx", &options).results.is_empty());
}

#[test]
fn remove_reverses_indexing() {
    let mut index = fox_and_dog();
    assert!(index.remove_document("1"));
    assert_no_reference(&index, "1");
    assert!(index.search("fox", &SearchOptions::default()).results.is_empty());
    assert_eq!(index.stats().total_artifacts, 1);
    assert!(index.artifact("1").is_none());
    // removing again is a no-op
    assert!(!index.remove_document("1"));
    assert!(!index.remove_document("never-existed"));
}

#[test]
fn update_is_idempotent() {
    let doc = Artifact::new("1", "completely different words here").with_title("Fox");
    let base = fox_and_dog();
    let mut once = base.clone();
    once.update_document(doc.clone()).unwrap();
    let mut twice = base.clone();
    twice.update_document(doc.clone()).unwrap();
    twice.update_document(doc).unwrap();

    let a = once.export_snapshot();
    let b = twice.export_snapshot();
    assert_eq!(a.index, b.index);
    assert_eq!(a.inverted_index, b.inverted_index);
    assert_eq!(a.artifacts, b.artifacts);
    assert!(once.postings("fox").is_none());
    assert!(once.postings("quick").is_none());
}

#[test]
fn filters_exclude_before_scoring() {
    let mut index = SearchIndex::new();
    index.index_document(Artifact::new("a", "parser combinator notes").with_type("note").with_tags(["draft"])).unwrap();
    index.index_document(Artifact::new("b", "parser written in rust").with_type("code").with_language("rust")).unwrap();
    index.index_document(Artifact::new("c", "parser in python").with_type("code").with_language("python").with_tags(["old"])).unwrap();

    let by_type = SearchOptions { filters: SearchFilters { artifact_type: Some("code".into()), ..Default::default() }, ..Default::default() };
    let ids: Vec<_> = index.search("parser", &by_type).results.into_iter().map(|h| h.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(!ids.contains(&"a".to_string()));

    let by_lang = SearchOptions { filters: SearchFilters { language: Some("rust".into()), ..Default::default() }, ..Default::default() };
    let ids: Vec<_> = index.search("parser", &by_lang).results.into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec!["b"]);

    let by_tags = SearchOptions { filters: SearchFilters { tags: vec!["draft".into(), "old".into()], ..Default::default() }, ..Default::default() };
    let mut ids: Vec<_> = index.search("parser", &by_tags).results.into_iter().map(|h| h.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "c"]);
}

#[test]
fn sorts_by_date_and_title() {
    let mut index = SearchIndex::new();
    let mut first = Artifact::new("x", "topic alpha").with_title("Zebra");
    first.created_at = datetime!(2024-01-01 0:00 UTC);
    let mut second = Artifact::new("y", "topic beta").with_title("apple");
    second.created_at = datetime!(2024-06-01 0:00 UTC);
    index.index_document(first).unwrap();
    index.index_document(second).unwrap();

    let by_date = SearchOptions { sort_by: SortBy::Date, sort_order: SortOrder::Asc, ..Default::default() };
    let ids: Vec<_> = index.search("topic", &by_date).results.into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec!["x", "y"]);

    let by_title = SearchOptions { sort_by: SortBy::Title, sort_order: SortOrder::Asc, ..Default::default() };
    let ids: Vec<_> = index.search("topic", &by_title).results.into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec!["y", "x"]);
}

#[test]
fn related_terms_come_from_matched_documents() {
    let mut index = SearchIndex::new();
    index.index_document(Artifact::new("1", "rust tokio async runtime")).unwrap();
    index.index_document(Artifact::new("2", "rust async channels")).unwrap();
    index.index_document(Artifact::new("3", "gardening tips")).unwrap();
    let results = index.search("rust", &SearchOptions::default());
    assert_eq!(results.suggestions.first().map(String::as_str), Some("async"));
    assert!(results.suggestions.len() <= 5);
    assert!(!results.suggestions.contains(&"rust".to_string()));
    assert!(!results.suggestions.contains(&"gardening".to_string()));
}

#[test]
fn advanced_and_intersects() {
    let mut index = SearchIndex::new();
    index.index_document(Artifact::new("1", "rust parser").with_title("Parsing in Rust")).unwrap();
    index.index_document(Artifact::new("2", "python parser").with_title("Parsing in Python")).unwrap();
    index.index_document(Artifact::new("3", "rust web server")).unwrap();

    let results = index.advanced_search("rust AND parser", &SearchOptions::default());
    let ids: Vec<_> = results.results.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["1"]);

    let results = index.advanced_search("title:python AND parser", &SearchOptions::default());
    let ids: Vec<_> = results.results.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["2"]);
}

#[test]
fn advanced_or_unions_and_adds_scores() {
    let mut index = SearchIndex::new();
    index.index_document(Artifact::new("1", "cats and dogs")).unwrap();
    index.index_document(Artifact::new("2", "only cats")).unwrap();
    index.index_document(Artifact::new("3", "only dogs")).unwrap();
    index.index_document(Artifact::new("4", "birds")).unwrap();

    let results = index.advanced_search("cats OR dogs", &SearchOptions::default());
    assert_eq!(results.total_results, 3);
    let both = results.results.iter().find(|h| h.id == "1").unwrap();
    let cats = index.search("cats", &SearchOptions::default()).results.into_iter().find(|h| h.id == "1").unwrap();
    let dogs = index.search("dogs", &SearchOptions::default()).results.into_iter().find(|h| h.id == "1").unwrap();
    assert!((both.score - (cats.score + dogs.score)).abs() < 1e-9);
}

#[test]
fn advanced_field_clauses() {
    let mut index = SearchIndex::new();
    index.index_document(Artifact::new("1", "body").with_type("code").with_language("Rust").with_tags(["backend"])).unwrap();
    index.index_document(Artifact::new("2", "body").with_type("note")).unwrap();

    let ids = |q: &str| -> Vec<String> {
        index.advanced_search(q, &SearchOptions::default()).results.into_iter().map(|h| h.id).collect()
    };
    assert_eq!(ids("type:code"), vec!["1"]);
    assert_eq!(ids("language:rust"), vec!["1"]);
    assert_eq!(ids("tags:back"), vec!["1"]);
    assert!(ids("colour:red").is_empty());
    assert_eq!(ids("colour:red OR type:note"), vec!["2"]);
}

#[test]
fn suggestions_complete_prefixes() {
    let mut index = SearchIndex::new();
    index.index_document(Artifact::new("1", "search searching searcher")).unwrap();
    index.index_document(Artifact::new("2", "searching season")).unwrap();
    let s = index.suggestions("sea", 10);
    assert_eq!(s, vec!["searching", "search", "searcher", "season"]);
    let s = index.suggestions("search", 10);
    assert_eq!(s, vec!["searching", "searcher"]);
    assert_eq!(index.suggestions("sea", 1), vec!["searching"]);
    assert!(index.suggestions("zzz", 5).is_empty());
}

#[test]
fn export_import_round_trip() {
    let index = fox_and_dog();
    let snapshot = index.export_snapshot();
    let mut restored = SearchIndex::new();
    restored.import_snapshot(snapshot.clone()).unwrap();

    let again = restored.export_snapshot();
    assert_eq!(snapshot.index, again.index);
    assert_eq!(snapshot.inverted_index, again.inverted_index);
    assert_eq!(snapshot.artifacts, again.artifacts);
    assert_eq!(restored.search("fox", &SearchOptions::default()).results[0].id, "1");
}

#[test]
fn snapshot_files_round_trip() {
    let dir = tempdir().unwrap();
    let snapshot = fox_and_dog().export_snapshot();
    for name in ["index.json", "index.bin"] {
        let path = dir.path().join("nested").join(name);
        save_snapshot(&path, &snapshot).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.inverted_index, snapshot.inverted_index);
        assert_eq!(loaded.artifacts, snapshot.artifacts);
    }
}

#[test]
fn snippets_highlight_matches() {
    let index = fox_and_dog();
    let hit = &index.search("fox", &SearchOptions::default()).results[0];
    assert_eq!(hit.snippet.as_deref(), Some("the quick brown <em>fox</em>"));
}
