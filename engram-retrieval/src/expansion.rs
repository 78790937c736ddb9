//! Query expansion: synonym substitution over common affect and
//! communication verbs, plus conjunctive decomposition.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Synonym table for the vocabulary conversational memories actually use.
fn synonym_map() -> &'static HashMap<&'static str, &'static [&'static str]> {
    static MAP: OnceLock<HashMap<&'static str, &'static [&'static str]>> = OnceLock::new();
    MAP.get_or_init(|| {
        let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        m.insert("love", &["adore", "cherish", "enjoy"][..]);
        m.insert("like", &["enjoy", "appreciate", "prefer"]);
        m.insert("hate", &["dislike", "despise", "resent"]);
        m.insert("happy", &["glad", "joyful", "cheerful"]);
        m.insert("glad", &["happy", "pleased"]);
        m.insert("sad", &["unhappy", "down", "upset"]);
        m.insert("angry", &["mad", "furious", "annoyed"]);
        m.insert("afraid", &["scared", "frightened", "anxious"]);
        m.insert("scared", &["afraid", "frightened"]);
        m.insert("want", &["desire", "wish", "need"]);
        m.insert("need", &["require", "want"]);
        m.insert("wish", &["want", "hope"]);
        m.insert("think", &["believe", "feel", "suppose"]);
        m.insert("believe", &["think", "feel"]);
        m.insert("know", &["understand", "realize"]);
        m.insert("feel", &["sense", "think"]);
        m.insert("remember", &["recall", "recollect"]);
        m.insert("forget", &["overlook", "neglect"]);
        m.insert("talk", &["speak", "chat", "converse"]);
        m.insert("tell", &["share", "mention"]);
        m.insert("said", &["told", "mentioned"]);
        m.insert("enjoy", &["love", "like", "relish"]);
        m.insert("favorite", &["preferred", "beloved"]);
        m.insert("miss", &["long", "yearn"]);
        m.insert("worry", &["fret", "stress"]);
        m
    })
}

/// Produce alternate queries by substituting synonyms for each token of
/// length > 3, one alternate per substitution, up to `max_expansions`
/// synonyms per token.
pub fn expand(query: &str, max_expansions: usize, include_original: bool) -> Vec<String> {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    let mut out = Vec::new();
    if include_original {
        out.push(query.to_string());
    }

    for (i, token) in tokens.iter().enumerate() {
        if token.len() <= 3 {
            continue;
        }
        let lower = token.to_lowercase();
        let Some(synonyms) = synonym_map().get(lower.as_str()) else {
            continue;
        };
        for synonym in synonyms.iter().take(max_expansions) {
            let mut alternate = tokens.clone();
            alternate[i] = synonym;
            let candidate = alternate.join(" ");
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
    }
    out
}

/// Split a conjunctive query into independent parts. Connectives and
/// fragments of length <= 5 are dropped; if fewer than two parts
/// survive, the original query stands alone.
pub fn decompose(query: &str) -> Vec<String> {
    static CONNECTIVES: OnceLock<Regex> = OnceLock::new();
    let re = CONNECTIVES.get_or_init(|| {
        Regex::new(r"(?i)\b(and|or|but|also)\b").expect("connective regex is valid")
    });

    let parts: Vec<String> = re
        .split(query)
        .map(str::trim)
        .filter(|p| p.len() > 5)
        .map(str::to_string)
        .collect();

    if parts.len() < 2 {
        vec![query.to_string()]
    } else {
        parts
    }
}

/// The variant set the pipeline embeds: the original query, conjunctive
/// parts when the query decomposes, and up to `max_synonyms` synonym
/// alternates.
pub fn variants(query: &str, max_synonyms: usize) -> Vec<String> {
    let mut out = vec![query.to_string()];

    let parts = decompose(query);
    if parts.len() > 1 {
        for part in parts {
            if !out.contains(&part) {
                out.push(part);
            }
        }
    }

    for alternate in expand(query, max_synonyms, false) {
        if !out.contains(&alternate) {
            out.push(alternate);
        }
    }
    out
}
