//! Content statistics and light structural analysis for artifacts.
//!
//! The results feed indexed metadata: a missing language is filled in from the
//! detected one and suggested tags are merged into the artifact's tag set.

use crate::Artifact;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

lazy_static! {
    static ref HEADING: Regex = Regex::new(r"(?m)^#{1,6}\s+\S").expect("valid regex");
    static ref CODE_FENCE: Regex = Regex::new(r"(?m)^```").expect("valid regex");
    static ref FUNCTION: Regex = Regex::new(
        r"(?m)^\s*(?:pub\s+)?(?:async\s+)?(?:fn|def|func|function)\s+\w+|\bfunction\s*\(|=>\s*\{"
    ).expect("valid regex");
    static ref LANGUAGE_HINTS: Vec<(&'static str, Regex)> = vec![
        ("rust", Regex::new(r"\bfn\s+\w+\s*[(<]|\blet\s+mut\b|\bimpl\b|::new\(|\bpub\s+(?:fn|struct|enum)\b").expect("valid regex")),
        ("python", Regex::new(r"(?m)^\s*def\s+\w+\(.*\):|^\s*import\s+\w+$|^\s*from\s+\w+\s+import\b|\bself\.\w+").expect("valid regex")),
        ("typescript", Regex::new(r"\binterface\s+\w+\s*\{|:\s*(?:string|number|boolean)\b|\btype\s+\w+\s*=").expect("valid regex")),
        ("javascript", Regex::new(r"\bconst\s+\w+\s*=|\bfunction\s*\w*\s*\(|=>|\bconsole\.log\(|\brequire\(").expect("valid regex")),
        ("go", Regex::new(r"(?m)^package\s+\w+$|\bfunc\s+\w+\(|:=").expect("valid regex")),
        ("java", Regex::new(r"\bpublic\s+(?:static\s+)?(?:class|void)\b|\bSystem\.out\.").expect("valid regex")),
        ("shell", Regex::new(r"(?m)^#!/bin/(?:ba)?sh|\becho\s+\$|\bfi$").expect("valid regex")),
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentAnalysis {
    pub line_count: usize,
    pub blank_line_count: usize,
    pub word_count: usize,
    pub char_count: usize,
    pub detected_language: Option<String>,
    pub heading_count: usize,
    pub code_block_count: usize,
    pub function_count: usize,
    pub suggested_tags: BTreeSet<String>,
}

pub fn analyze(content: &str) -> ContentAnalysis {
    let line_count = content.lines().count();
    let blank_line_count = content.lines().filter(|l| l.trim().is_empty()).count();
    let heading_count = HEADING.find_iter(content).count();
    let code_block_count = CODE_FENCE.find_iter(content).count() / 2;
    let function_count = FUNCTION.find_iter(content).count();
    let detected_language = detect_language(content, heading_count, code_block_count);

    let mut suggested_tags = BTreeSet::new();
    if let Some(lang) = &detected_language {
        suggested_tags.insert(lang.clone());
    }
    if code_block_count > 0 || function_count > 0 {
        suggested_tags.insert("code".to_string());
    }
    if heading_count > 0 {
        suggested_tags.insert("documentation".to_string());
    }

    ContentAnalysis {
        line_count,
        blank_line_count,
        word_count: content.split_whitespace().count(),
        char_count: content.chars().count(),
        detected_language,
        heading_count,
        code_block_count,
        function_count,
        suggested_tags,
    }
}

fn detect_language(content: &str, headings: usize, code_blocks: usize) -> Option<String> {
    let trimmed = content.trim_start();
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(content).is_ok()
    {
        return Some("json".into());
    }
    let best = LANGUAGE_HINTS
        .iter()
        .map(|(lang, re)| (*lang, re.find_iter(content).count()))
        .filter(|(_, hits)| *hits > 0)
        .max_by_key(|(_, hits)| *hits);
    match best {
        Some((lang, hits)) if hits > headings => Some(lang.to_string()),
        _ if headings > 0 || code_blocks > 0 => Some("markdown".into()),
        Some((lang, _)) => Some(lang.to_string()),
        None => None,
    }
}

/// Fill in metadata the caller left out. An explicit language is never overridden.
pub fn enrich(mut artifact: Artifact, analysis: &ContentAnalysis) -> Artifact {
    if artifact.language.is_none() {
        artifact.language = analysis.detected_language.clone();
    }
    artifact.tags.extend(analysis.suggested_tags.iter().cloned());
    artifact
}
