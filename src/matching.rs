//! Decide whether a piece of text mentions any of a list of words
//!
//! There are two ways to do it. `Substring` lowercases both sides and looks for the candidate
//! anywhere in the text; it's fast and fine for fields that are already tidy, like subject
//! headings. `Tokenized` splits the text into words and singularizes every word and every
//! candidate, so "frogs" matches "frog" but "education" does not match "cat". It is much slower
//! with long candidate lists.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;
use marc::ExtractedRecord;
use errors::*;

/// Read a candidate list, one word or phrase per line. Blank lines are ignored.
pub fn read_wordlist<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|err| Error::MissingFile(path.display().to_string(), Some(err)))?;
    let mut words = vec![];
    for line in BufReader::new(file).lines() {
        let line = line?;
        let word = line.trim();
        if !word.is_empty() {
            words.push(word.to_string());
        }
    }
    Ok(words)
}

/// Splits text into words and reduces words to a base form
///
/// Anything that does these two things can stand in for the built in analyzer.
pub trait Analyzer {
    fn tokenize(&self, text: &str) -> Vec<String>;
    fn singularize(&self, word: &str) -> String;
}

/// Unicode word boundaries plus a small rule based English singularizer
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeAnalyzer;

impl Analyzer for UnicodeAnalyzer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words().map(|w| w.to_string()).collect()
    }

    fn singularize(&self, word: &str) -> String {
        singularize(word)
    }
}

const IRREGULAR: &'static [(&'static str, &'static str)] = &[
    ("children", "child"), ("feet", "foot"), ("geese", "goose"), ("teeth", "tooth"),
    ("mice", "mouse"), ("lice", "louse"), ("men", "man"), ("women", "woman"),
    ("oxen", "ox"), ("people", "person"), ("dice", "die"), ("wolves", "wolf"),
    ("calves", "calf"), ("halves", "half"), ("knives", "knife"), ("leaves", "leaf"),
    ("lives", "life"), ("loaves", "loaf"), ("selves", "self"), ("shelves", "shelf"),
    ("thieves", "thief"), ("wives", "wife"), ("elves", "elf"), ("scarves", "scarf"),
    ("wharves", "wharf"), ("hooves", "hoof"), ("cacti", "cactus"), ("fungi", "fungus"),
    ("octopi", "octopus"), ("larvae", "larva"), ("criteria", "criterion"),
    ("phenomena", "phenomenon"), ("indices", "index"), ("matrices", "matrix"),
];

/// Words that are the same in the singular and the plural, or just aren't plurals
const UNINFLECTED: &'static [&'static str] = &[
    "bison", "buffalo", "cod", "deer", "fish", "moose", "salmon", "sheep", "shrimp", "species",
    "series", "swine", "trout", "tuna", "news", "means", "this", "his", "is", "was", "has",
    "its", "as", "us", "yes", "gas", "bus", "plus", "thus", "always", "perhaps", "whereas",
];

/// Lowercase an English noun and strip its plural ending
pub fn singularize(word: &str) -> String {
    let lower = word.to_lowercase();
    if let Some(&(_, single)) = IRREGULAR.iter().find(|&&(plural, _)| plural == lower) {
        return single.to_string();
    }
    if UNINFLECTED.iter().any(|&w| w == lower) || lower.chars().count() < 3 {
        return lower;
    }
    let stem = |suffix_len: usize, replacement: &str| -> String {
        let mut s = lower[..lower.len() - suffix_len].to_string();
        s.push_str(replacement);
        s
    };
    if lower.ends_with("ies") && lower.len() > 4 {
        stem(3, "y")
    } else if lower.ends_with("sses") {
        stem(2, "")
    } else if lower.ends_with("ches") || lower.ends_with("shes")
        || lower.ends_with("xes") || lower.ends_with("zzes") {
        stem(2, "")
    } else if lower.ends_with("oes") && lower.len() > 4 {
        stem(2, "")
    } else if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        lower
    } else if lower.ends_with('s') {
        stem(1, "")
    } else {
        lower
    }
}

/// How candidates are compared with text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Case-folded containment. `padded` surrounds both sides with spaces first, so a
    /// candidate only matches at (whitespace) word boundaries.
    Substring { padded: bool },
    /// Tokenize, case-fold and singularize, then compare whole words
    Tokenized,
}

/// Outcome of checking one text against a candidate list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distinct matching candidates, in candidate order, as the candidate was written
    pub terms: Vec<String>,
    /// How many (word, candidate) pairs matched. Substring matches count once per candidate.
    pub hits: usize,
}

impl MatchResult {
    /// For pipelines that don't filter on text at all
    pub fn unconditional() -> Self {
        MatchResult { matched: true, terms: vec![], hits: 0 }
    }

    /// Fold another result into this one, keeping terms distinct
    pub fn merge(&mut self, other: MatchResult) {
        self.matched |= other.matched;
        self.hits += other.hits;
        for term in other.terms {
            if !self.terms.contains(&term) {
                self.terms.push(term);
            }
        }
    }
}

/// A candidate list prepared for one policy, so the normalizing happens once per run
pub struct Matcher {
    policy: MatchPolicy,
    analyzer: Box<dyn Analyzer>,
    /// (as written, normalized)
    candidates: Vec<(String, String)>,
}

impl Matcher {
    pub fn new<S: AsRef<str>>(policy: MatchPolicy, candidates: &[S]) -> Self {
        Matcher::with_analyzer(policy, candidates, Box::new(UnicodeAnalyzer))
    }

    pub fn with_analyzer<S: AsRef<str>>(policy: MatchPolicy, candidates: &[S],
                                        analyzer: Box<dyn Analyzer>) -> Self {
        let mut prepared: Vec<(String, String)> = vec![];
        for candidate in candidates {
            let original = candidate.as_ref();
            let normal = match policy {
                MatchPolicy::Substring { padded: true } => format!(" {} ", original.to_lowercase()),
                MatchPolicy::Substring { padded: false } => original.to_lowercase(),
                MatchPolicy::Tokenized => analyzer.singularize(&original.to_lowercase()),
            };
            if normal.trim().is_empty() || prepared.iter().any(|&(_, ref n)| *n == normal) {
                continue;
            }
            prepared.push((original.to_string(), normal));
        }
        Matcher { policy: policy, analyzer: analyzer, candidates: prepared }
    }

    pub fn check(&self, text: &str) -> MatchResult {
        let mut result = MatchResult::default();
        match self.policy {
            MatchPolicy::Substring { padded } => {
                let folded = if padded {
                    format!(" {} ", text.to_lowercase())
                } else {
                    text.to_lowercase()
                };
                for &(ref original, ref normal) in &self.candidates {
                    if folded.contains(normal.as_str()) {
                        result.hits += 1;
                        result.terms.push(original.clone());
                    }
                }
            }
            MatchPolicy::Tokenized => {
                let words: Vec<String> = self.analyzer.tokenize(text).iter()
                    .map(|w| self.analyzer.singularize(&w.to_lowercase()))
                    .collect();
                for &(ref original, ref normal) in &self.candidates {
                    let hits = words.iter().filter(|w| *w == normal).count();
                    if hits > 0 {
                        result.hits += hits;
                        result.terms.push(original.clone());
                    }
                }
            }
        }
        result.matched = !result.terms.is_empty();
        result
    }
}

/// One-shot matching, when there is no candidate list worth preparing ahead of time
pub struct MatchEngine {
    policy: MatchPolicy,
}

impl MatchEngine {
    pub fn new(policy: MatchPolicy) -> Self {
        MatchEngine { policy: policy }
    }

    pub fn check<S: AsRef<str>>(&self, text: &str, candidates: &[S]) -> MatchResult {
        Matcher::new(self.policy, candidates).check(text)
    }
}

/// Which fields of a record get matched, and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchScope {
    /// All values of all these fields joined with spaces, matched once
    Concatenated(Vec<String>),
    /// Each field (its values joined with spaces) matched on its own, results unioned
    Independent(Vec<String>),
}

impl MatchScope {
    pub fn check(&self, matcher: &Matcher, record: &ExtractedRecord) -> MatchResult {
        match *self {
            MatchScope::Concatenated(ref fields) => {
                let text: Vec<String> = fields.iter()
                    .filter_map(|f| record.joined(f, " "))
                    .collect();
                if text.is_empty() {
                    return MatchResult::default();
                }
                matcher.check(&text.join(" "))
            }
            MatchScope::Independent(ref fields) => {
                let mut result = MatchResult::default();
                for text in fields.iter().filter_map(|f| record.joined(f, " ")) {
                    result.merge(matcher.check(&text));
                }
                result
            }
        }
    }
}
