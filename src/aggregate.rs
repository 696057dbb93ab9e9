//! Accumulate per-record results across a whole run
//!
//! Every aggregator takes records one at a time through `ingest` and hands back its whole state
//! so far from `flush`. Flushing doesn't reset anything: the ingestor flushes after every file
//! and overwrites the last snapshot, so the newest file on disk always covers everything read.
use std::collections::BTreeMap;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use regex::Regex;
use serde_json::{self, Value};
use farm::{FarmMap, PlainSet, new_farm, pair_key};
use marc::ExtractedRecord;
use matching::MatchResult;
use errors::*;

/// What an aggregator writes out
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Text(String),
    Json(Value),
}

impl Snapshot {
    pub fn render(&self) -> Result<Vec<u8>> {
        match *self {
            Snapshot::Text(ref text) => Ok(text.clone().into_bytes()),
            Snapshot::Json(ref value) => Ok(serde_json::to_vec_pretty(value)?),
        }
    }
}

pub trait Aggregator {
    fn ingest(&mut self, record: &ExtractedRecord, matched: &MatchResult);
    fn flush(&self) -> Result<Snapshot>;
}

/// Decides whether a record counts at all
pub type Predicate = Box<dyn Fn(&ExtractedRecord, &MatchResult) -> bool>;

/// Records that have every one of `fields` and (if `need_match`) matched some candidate
pub fn requires(fields: &[&str], need_match: bool) -> Predicate {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    Box::new(move |record: &ExtractedRecord, matched: &MatchResult| {
        (!need_match || matched.matched) && fields.iter().all(|f| record.has(f))
    })
}

//
// Years
//

/// Pulls a four digit year out of a MARC date like "c1923.", "[1899]" or "192-?"
///
/// Hyphens become 5 first, so an unknown last digit lands mid-decade. Then punctuation goes and
/// the first four digits in a row are the year.
pub struct YearParser {
    punctuation: Regex,
    four_digits: Regex,
}

impl Default for YearParser {
    fn default() -> Self {
        YearParser {
            punctuation: Regex::new(r"[.,/#!$%^&*\[\];:{}=\-_`~()]").unwrap(),
            four_digits: Regex::new(r"[0-9]{4}").unwrap(),
        }
    }
}

impl YearParser {
    pub fn parse(&self, raw: &str) -> Option<String> {
        let dashed = raw.replace('-', "5");
        let cleaned = self.punctuation.replace_all(&dashed, "");
        self.four_digits.find(&cleaned).map(|m| m.as_str().to_string())
    }
}

/// One-off version of `YearParser::parse`
pub fn normalize_year(raw: &str) -> Option<String> {
    YearParser::default().parse(raw)
}

//
// Rows
//

/// One column of a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    /// Every value of the field, joined with spaces
    Joined(String),
    /// The normalized year from the first value of the field. Empty if there is no year in it.
    Year(String),
}

/// Tab separated rows, one per qualifying record
pub struct RowList {
    columns: Vec<Column>,
    qualifies: Predicate,
    years: YearParser,
    rows: Vec<String>,
    failures: usize,
}

impl RowList {
    pub fn new(columns: Vec<Column>, qualifies: Predicate) -> Self {
        RowList {
            columns: columns,
            qualifies: qualifies,
            years: YearParser::default(),
            rows: vec![],
            failures: 0,
        }
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Year cells that had a value with no year in it. Those cells are left empty.
    pub fn failures(&self) -> usize {
        self.failures
    }

    fn cell(&mut self, record: &ExtractedRecord, column: &Column) -> String {
        match *column {
            Column::Joined(ref field) => record.joined(field, " ").unwrap_or_default(),
            Column::Year(ref field) => {
                let raw = match record.first(field) {
                    Some(raw) => raw,
                    None => return String::new(),
                };
                match self.years.parse(raw) {
                    Some(year) => year,
                    None => {
                        self.failures += 1;
                        warn!("No year in {:?}", raw);
                        String::new()
                    }
                }
            }
        }
    }
}

impl Aggregator for RowList {
    fn ingest(&mut self, record: &ExtractedRecord, matched: &MatchResult) {
        if !(self.qualifies)(record, matched) {
            return;
        }
        let columns = self.columns.clone();
        let cells: Vec<String> = columns.iter()
            .map(|column| self.cell(record, column))
            .collect();
        debug!("Row: {:?}", cells);
        self.rows.push(cells.join("\t"));
    }

    fn flush(&self) -> Result<Snapshot> {
        Ok(Snapshot::Text(self.rows.join("\n")))
    }
}

//
// Year histogram
//

#[derive(Debug, Serialize)]
struct YearCount<'a> {
    #[serde(rename = "Year")]
    year: &'a str,
    count: usize,
}

/// Count of matched records per publication year
pub struct YearHistogram {
    field: String,
    years: YearParser,
    counts: BTreeMap<String, usize>,
    failures: usize,
}

impl YearHistogram {
    pub fn new<S: Into<String>>(field: S) -> Self {
        YearHistogram {
            field: field.into(),
            years: YearParser::default(),
            counts: BTreeMap::new(),
            failures: 0,
        }
    }

    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    /// Records that had a year field with no year in it
    pub fn failures(&self) -> usize {
        self.failures
    }
}

impl Aggregator for YearHistogram {
    fn ingest(&mut self, record: &ExtractedRecord, matched: &MatchResult) {
        if !matched.matched {
            return;
        }
        let raw = match record.first(&self.field) {
            Some(raw) => raw,
            None => return,
        };
        match self.years.parse(raw) {
            Some(year) => *self.counts.entry(year).or_insert(0) += 1,
            None => {
                self.failures += 1;
                warn!("No year in {:?}", raw);
            }
        }
    }

    fn flush(&self) -> Result<Snapshot> {
        let out: BTreeMap<&str, YearCount> = self.counts.iter()
            .map(|(year, &count)| (year.as_str(), YearCount { year: year.as_str(), count: count }))
            .collect();
        Ok(Snapshot::Json(serde_json::to_value(&out)?))
    }
}

//
// Cooccurrence network
//

/// Where new nodes are put. Only the viewer cares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Uniform in [0, 100) on both axes, from a seeded generator
    Random { seed: u64 },
    Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
    /// How many qualifying records mentioned this term
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

#[derive(Serialize)]
struct Network<'a> {
    nodes: &'a [Node],
    edges: &'a [Edge],
}

/// Terms as nodes, and an edge wherever two terms showed up in the same record
///
/// Each pair of terms gets one edge no matter how often it recurs; only node sizes keep
/// counting.
pub struct CoOccurrenceGraph {
    qualifies: Predicate,
    placement: Placement,
    rng: StdRng,
    nodes: Vec<Node>,
    by_label: FarmMap<String, usize>,
    edges: Vec<Edge>,
    linked: PlainSet<u64>,
}

impl CoOccurrenceGraph {
    pub fn new(placement: Placement) -> Self {
        let seed = match placement {
            Placement::Random { seed } => seed,
            Placement::Origin => 0,
        };
        CoOccurrenceGraph {
            qualifies: Box::new(|_: &ExtractedRecord, matched: &MatchResult| matched.matched),
            placement: placement,
            rng: StdRng::seed_from_u64(seed),
            nodes: vec![],
            by_label: new_farm(),
            edges: vec![],
            linked: PlainSet::default(),
        }
    }

    pub fn with_predicate(mut self, qualifies: Predicate) -> Self {
        self.qualifies = qualifies;
        self
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, label: &str) -> Option<&Node> {
        self.by_label.get(label).map(|&i| &self.nodes[i])
    }

    fn node_index(&mut self, label: &str) -> usize {
        if let Some(&i) = self.by_label.get(label) {
            return i;
        }
        let (x, y) = match self.placement {
            Placement::Random { .. } => (self.rng.gen_range(0.0..100.0), self.rng.gen_range(0.0..100.0)),
            Placement::Origin => (0.0, 0.0),
        };
        let i = self.nodes.len();
        self.nodes.push(Node { id: format!("n{}", i), label: label.to_string(), x: x, y: y, size: 0 });
        self.by_label.insert(label.to_string(), i);
        i
    }
}

impl Aggregator for CoOccurrenceGraph {
    fn ingest(&mut self, record: &ExtractedRecord, matched: &MatchResult) {
        if matched.terms.len() < 2 || !(self.qualifies)(record, matched) {
            return;
        }
        debug!("Network entry: {:?}", matched.terms);
        let indices: Vec<usize> = matched.terms.iter()
            .map(|term| self.node_index(term))
            .collect();
        for &i in &indices {
            self.nodes[i].size += 1;
        }
        for (a, &i) in indices.iter().enumerate() {
            for &j in &indices[a + 1..] {
                if i == j || !self.linked.insert(pair_key(i, j)) {
                    continue;
                }
                let edge = Edge {
                    id: format!("e{}", self.edges.len()),
                    source: self.nodes[i].id.clone(),
                    target: self.nodes[j].id.clone(),
                };
                self.edges.push(edge);
            }
        }
    }

    fn flush(&self) -> Result<Snapshot> {
        let network = Network { nodes: &self.nodes, edges: &self.edges };
        Ok(Snapshot::Json(serde_json::to_value(&network)?))
    }
}

//
// Title list
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleEntry {
    pub title: String,
    pub matches: Vec<String>,
}

/// Titles of qualifying records, with the candidates they matched
pub struct TitleList {
    field: String,
    qualifies: Predicate,
    entries: Vec<TitleEntry>,
}

impl TitleList {
    pub fn new<S: Into<String>>(field: S) -> Self {
        TitleList {
            field: field.into(),
            qualifies: Box::new(|_: &ExtractedRecord, matched: &MatchResult| matched.matched),
            entries: vec![],
        }
    }

    pub fn with_predicate(mut self, qualifies: Predicate) -> Self {
        self.qualifies = qualifies;
        self
    }

    pub fn entries(&self) -> &[TitleEntry] {
        &self.entries
    }
}

impl Aggregator for TitleList {
    fn ingest(&mut self, record: &ExtractedRecord, matched: &MatchResult) {
        if !(self.qualifies)(record, matched) {
            return;
        }
        if let Some(title) = record.joined(&self.field, " ") {
            debug!("Found {:?} in {:?}", matched.terms, title);
            self.entries.push(TitleEntry { title: title, matches: matched.terms.clone() });
        }
    }

    fn flush(&self) -> Result<Snapshot> {
        Ok(Snapshot::Json(serde_json::to_value(&self.entries)?))
    }
}
