// src/scholar/normalize.rs
//! Raw scholar fields -> canonical `Publication` records.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Publication, YearLabel};
use crate::scholar::types::RawPublication;

pub const UNKNOWN_TITLE: &str = "Unknown Title";

const EMPHASIS_OPEN: &str = "<strong>";
const EMPHASIS_CLOSE: &str = "</strong>";

/// Exactly four ASCII digits, otherwise unknown.
pub fn parse_year(raw: &str) -> Option<i32> {
    let t = raw.trim();
    if t.len() != 4 || !t.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    t.parse::<i32>().ok().filter(|y| (1000..=9999).contains(y))
}

/// Wraps the owner's name in the author list with an emphasis marker.
#[derive(Debug, Clone)]
pub struct AuthorHighlighter {
    re: Option<Regex>,
}

impl AuthorHighlighter {
    /// Patterns: full name, initial + surname, initial + "." + surname, plus literal aliases.
    pub fn new(owner_name: &str, aliases: &[String]) -> Self {
        let mut alts: Vec<String> = Vec::new();
        let parts: Vec<&str> = owner_name.split_whitespace().collect();
        if !parts.is_empty() {
            let full = parts.iter().map(|p| regex::escape(p)).collect::<Vec<_>>();
            alts.push(format!(r"\b{}\b", full.join(r"\s+")));
        }
        if parts.len() >= 2 {
            let surname = regex::escape(parts[parts.len() - 1]);
            if let Some(initial) = parts[0].chars().next() {
                let initial = regex::escape(&initial.to_string());
                alts.push(format!(r"\b{initial}\.?\s*{surname}\b"));
            }
        }
        for a in aliases {
            let a = a.trim();
            if !a.is_empty() {
                alts.push(word_bounded(a));
            }
        }

        if alts.is_empty() {
            return Self { re: None };
        }
        // Longest first so "Abhishek Dixit" wins over a shorter alias at the same spot.
        alts.sort_by_key(|a| std::cmp::Reverse(a.len()));
        alts.dedup();
        let pattern = format!(r"(?i)(?:{})", alts.join("|"));
        Self {
            re: compile_pattern(&pattern),
        }
    }

    pub fn highlight(&self, authors: &str) -> String {
        let Some(re) = &self.re else {
            return authors.to_string();
        };
        if authors.is_empty() {
            return String::new();
        }
        let plain = strip_emphasis(authors);
        re.replace_all(&plain, |c: &regex::Captures<'_>| {
            format!("{EMPHASIS_OPEN}{}{EMPHASIS_CLOSE}", &c[0])
        })
        .into_owned()
    }
}

/// A rejected pattern disables highlighting for the run, loudly.
fn compile_pattern(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(
                target: "scholar",
                error = %e,
                "author highlight pattern rejected, highlighting disabled"
            );
            None
        }
    }
}

/// `\b` only makes sense next to word characters; aliases may end in punctuation.
fn word_bounded(literal: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let mut out = String::new();
    if is_word(literal.chars().next()) {
        out.push_str(r"\b");
    }
    out.push_str(&regex::escape(literal));
    if is_word(literal.chars().last()) {
        out.push_str(r"\b");
    }
    out
}

fn strip_emphasis(s: &str) -> String {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?strong>").expect("emphasis regex"));
    RE.replace_all(s, "").into_owned()
}

/// Build the canonical record for the publication discovered at position `seq` (1-based).
pub fn normalize_record(seq: i32, raw: RawPublication, hl: &AuthorHighlighter) -> Publication {
    let title = raw
        .title
        .map(|t| collapse_ws(&t))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    let authors = hl.highlight(&collapse_ws(raw.authors.as_deref().unwrap_or_default()));

    Publication {
        title,
        authors,
        venue: collapse_ws(raw.venue.as_deref().unwrap_or_default()),
        year: raw.pub_year.as_deref().and_then(parse_year),
        citations: raw.num_citations.unwrap_or(0).max(0),
        scholar_url: raw.pub_url.unwrap_or_default().trim().to_string(),
        pub_number: seq,
    }
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearGroup {
    pub label: YearLabel,
    pub publications: Vec<Publication>,
}

/// Group by year, newest first, unknown last. Discovery order is kept within a group.
pub fn group_by_year(records: Vec<Publication>) -> Vec<YearGroup> {
    let mut groups: Vec<YearGroup> = Vec::new();
    let mut sorted = records;
    // stable: equal labels stay in discovery order
    sorted.sort_by_key(|p| p.year_label());
    for p in sorted {
        let label = p.year_label();
        match groups.last_mut() {
            Some(g) if g.label == label => g.publications.push(p),
            _ => groups.push(YearGroup {
                label,
                publications: vec![p],
            }),
        }
    }
    groups
}

/// Flatten groups back to one list; each record carries its group's integer year.
pub fn flatten_groups(groups: Vec<YearGroup>) -> Vec<Publication> {
    groups
        .into_iter()
        .flat_map(|g| {
            let year = g.label.as_year();
            g.publications.into_iter().map(move |mut p| {
                p.year = year;
                p
            })
        })
        .collect()
}
