extern crate marcflow;
extern crate flate2;
extern crate serde_json;
extern crate tempfile;

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;
use marcflow::errors::*;
use marcflow::aggregate::{requires, Column, CoOccurrenceGraph, Placement, RowList, TitleList, YearHistogram};
use marcflow::ingest::{part_name, FileOutcome, IngestState, Ingestor, Manifest, MarcXmlFiles,
                       OpenFailurePolicy, Pipeline, RecordSource};
use marcflow::marc::{RawRecord, TagMap};
use marcflow::matching::{Matcher, MatchPolicy, MatchScope};

/// One record with the given (tag, code, text) subfields, each in its own datafield
fn record(subfields: &[(&str, char, &str)]) -> String {
    let mut xml = String::from("<record>\n  <leader>00000cam  22000001  4500</leader>\n");
    for &(tag, code, text) in subfields {
        xml.push_str(&format!(
            "  <datafield tag=\"{}\" ind1=\" \" ind2=\" \"><subfield code=\"{}\">{}</subfield></datafield>\n",
            tag, code, text));
    }
    xml.push_str("</record>\n");
    xml
}

fn write_part(dir: &Path, name: &str, records: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut gz = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    gz.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n").unwrap();
    gz.write_all(b"<marc:collection xmlns:marc=\"http://www.loc.gov/MARC21/slim\">\n").unwrap();
    for r in records {
        // The LoC dumps use the marc: prefix
        gz.write_all(r.replace("<record>", "<marc:record>")
                      .replace("</record>", "</marc:record>")
                      .replace("<leader>", "<marc:leader>")
                      .replace("</leader>", "</marc:leader>")
                      .replace("<datafield", "<marc:datafield")
                      .replace("</datafield>", "</marc:datafield>")
                      .replace("<subfield", "<marc:subfield")
                      .replace("</subfield>", "</marc:subfield>")
                      .as_bytes()).unwrap();
    }
    gz.write_all(b"</marc:collection>\n").unwrap();
    gz.finish().unwrap();
    path
}

fn titles(titles: &[&str]) -> Vec<String> {
    titles.iter().map(|t| record(&[("245", 'a', t)])).collect()
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_reader(File::open(path).unwrap()).unwrap()
}

#[test]
fn drains_a_collection_in_order() {
    let dir = TempDir::new().unwrap();
    write_part(dir.path(), &part_name("Test", "2014", 1), &titles(&["Monkey business", "Cats"]));
    write_part(dir.path(), &part_name("Test", "2014", 2), &titles(&["Dogs"]));
    write_part(dir.path(), &part_name("Test", "2014", 3), &titles(&["The monkey king", "Birds", "Fish"]));
    let output = dir.path().join("out").join("titles.json");

    let mut pipeline = Pipeline::new("245:*=Title".parse().unwrap(), TitleList::new("Title"))
        .matching(Matcher::new(MatchPolicy::Substring { padded: false }, &["monkey"]),
                  MatchScope::Concatenated(vec!["Title".to_string()]));
    let mut ingestor = Ingestor::new(Manifest::collection(dir.path(), "Test", "2014", 3))
        .output(&output);
    let report = ingestor.run(&mut pipeline);

    assert!(report.drained());
    assert_eq!(report.records, 6);
    assert_eq!(report.files.iter().map(|f| f.records).collect::<Vec<_>>(), vec![2, 1, 3]);
    assert_eq!(ingestor.transitions(), &[
        IngestState::Idle,
        IngestState::LoadingFile(0), IngestState::StreamingRecords(0), IngestState::FileComplete(0),
        IngestState::LoadingFile(1), IngestState::StreamingRecords(1), IngestState::FileComplete(1),
        IngestState::LoadingFile(2), IngestState::StreamingRecords(2), IngestState::FileComplete(2),
        IngestState::Drained,
    ][..]);

    let json = read_json(&output);
    assert_eq!(json, serde_json::json!([
        {"title": "Monkey business", "matches": ["monkey"]},
        {"title": "The monkey king", "matches": ["monkey"]},
    ]));
    assert!(!output.with_extension("json.partial").exists());
}

/// Checks the output on disk every time a new file is about to be opened
struct Watching {
    output: PathBuf,
    seen: Rc<RefCell<Vec<Option<usize>>>>,
}

impl RecordSource for Watching {
    fn open(&mut self, path: &Path) -> Result<Box<dyn Iterator<Item = Result<RawRecord>>>> {
        let rows = fs::read_to_string(&self.output).ok()
            .map(|text| text.lines().filter(|l| !l.is_empty()).count());
        self.seen.borrow_mut().push(rows);
        MarcXmlFiles.open(path)
    }
}

#[test]
fn snapshot_grows_after_every_file() {
    let dir = TempDir::new().unwrap();
    let parts = vec![
        write_part(dir.path(), "a.xml.gz", &titles(&["One"])),
        write_part(dir.path(), "b.xml.gz", &titles(&["Two", "Three"])),
        write_part(dir.path(), "c.xml.gz", &titles(&["Four"])),
    ];
    let output = dir.path().join("rows.tsv");
    let seen = Rc::new(RefCell::new(vec![]));
    let watching = Watching { output: output.clone(), seen: seen.clone() };

    let rows = RowList::new(vec![Column::Joined("Title".to_string())], requires(&["Title"], false));
    let mut pipeline = Pipeline::new("245:a=Title".parse().unwrap(), rows);
    let mut ingestor = Ingestor::with_source(Manifest::from_paths(parts), watching)
        .output(&output);
    let report = ingestor.run(&mut pipeline);

    assert!(report.drained());
    // Nothing before the first file, then everything read so far
    assert_eq!(*seen.borrow(), vec![None, Some(1), Some(3)]);
    assert_eq!(fs::read_to_string(&output).unwrap(), "One\nTwo\nThree\nFour");
}

#[test]
fn missing_parts_are_skipped_by_default() {
    let dir = TempDir::new().unwrap();
    write_part(dir.path(), &part_name("Test", "2014", 1), &titles(&["Fox"]));
    write_part(dir.path(), &part_name("Test", "2014", 3), &titles(&["Wolf"]));
    let output = dir.path().join("out.tsv");

    let rows = RowList::new(vec![Column::Joined("Title".to_string())], requires(&["Title"], false));
    let mut pipeline = Pipeline::new("245:*=Title".parse().unwrap(), rows);
    let mut ingestor = Ingestor::new(Manifest::collection(dir.path(), "Test", "2014", 3))
        .output(&output);
    let report = ingestor.run(&mut pipeline);

    assert!(report.drained());
    assert_eq!(report.skipped(), vec![dir.path().join(part_name("Test", "2014", 2)).as_path()]);
    match report.files[1].outcome {
        FileOutcome::Skipped(Error::MissingFile(..)) => {}
        ref other => panic!("expected a missing file, got {:?}", other),
    }
    assert_eq!(fs::read_to_string(&output).unwrap(), "Fox\nWolf");
}

#[test]
fn missing_part_halts_when_asked() {
    let dir = TempDir::new().unwrap();
    write_part(dir.path(), &part_name("Test", "2014", 1), &titles(&["Fox"]));
    let output = dir.path().join("out.tsv");

    let rows = RowList::new(vec![Column::Joined("Title".to_string())], requires(&["Title"], false));
    let mut pipeline = Pipeline::new("245:*=Title".parse().unwrap(), rows);
    let mut ingestor = Ingestor::new(Manifest::collection(dir.path(), "Test", "2014", 2))
        .output(&output)
        .on_open_failure(OpenFailurePolicy::Halt);
    let report = ingestor.run(&mut pipeline);

    assert!(!report.drained());
    assert_eq!(ingestor.state(), IngestState::Failed);
    // The first file's snapshot is still there
    assert_eq!(fs::read_to_string(&output).unwrap(), "Fox");
}

#[test]
fn truncated_gzip_fails_without_flushing() {
    let dir = TempDir::new().unwrap();
    let good = write_part(dir.path(), "good.xml.gz", &titles(&["Fox"]));
    let bad = write_part(dir.path(), "bad.xml.gz", &titles(&["Wolf", "Bear", "Hare"]));
    let bytes = fs::read(&bad).unwrap();
    fs::write(&bad, &bytes[..bytes.len() / 2]).unwrap();
    let output = dir.path().join("out.tsv");

    let rows = RowList::new(vec![Column::Joined("Title".to_string())], requires(&["Title"], false));
    let mut pipeline = Pipeline::new("245:*=Title".parse().unwrap(), rows);
    let mut ingestor = Ingestor::new(Manifest::from_paths(vec![good, bad])).output(&output);
    let report = ingestor.run(&mut pipeline);

    assert_eq!(report.state, IngestState::Failed);
    match report.files[1].outcome {
        FileOutcome::Failed(_) => {}
        ref other => panic!("expected a failure, got {:?}", other),
    }
    assert_eq!(fs::read_to_string(&output).unwrap(), "Fox");
}

#[test]
fn cooccurrence_network_end_to_end() {
    let dir = TempDir::new().unwrap();
    let part = write_part(dir.path(), "animals.xml.gz", &titles(&[
        "The fox and the wolf",
        "Foxes, wolves and bears",
        "A bear alone",
        "Of wolves and foxes",
    ]));
    let output = dir.path().join("network.json");

    let graph = CoOccurrenceGraph::new(Placement::Origin);
    let mut pipeline = Pipeline::new("245:*=Title".parse().unwrap(), graph)
        .matching(Matcher::new(MatchPolicy::Tokenized, &["fox", "wolf", "bear"]),
                  MatchScope::Concatenated(vec!["Title".to_string()]));
    let report = Ingestor::new(Manifest::from_paths(vec![part])).output(&output).run(&mut pipeline);
    assert!(report.drained());

    let graph = pipeline.into_aggregator();
    assert_eq!(graph.node("fox").unwrap().size, 3);
    assert_eq!(graph.node("wolf").unwrap().size, 3);
    assert_eq!(graph.node("bear").unwrap().size, 1);
    // fox-wolf once despite three records, plus fox-bear and wolf-bear
    assert_eq!(graph.edges().len(), 3);

    let json = read_json(&output);
    assert_eq!(json["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(json["edges"].as_array().unwrap().len(), 3);
    assert_eq!(json["nodes"][0]["id"], "n0");
    assert_eq!(json["edges"][0]["source"], "n0");
    assert_eq!(json["edges"][0]["target"], "n1");
}

#[test]
fn year_histogram_end_to_end() {
    let dir = TempDir::new().unwrap();
    let part = write_part(dir.path(), "visual.xml.gz", &[
        record(&[("260", 'c', "c1923.")]),
        record(&[("260", 'c', "[1923]")]),
        record(&[("260", 'c', "192-?")]),
        record(&[("260", 'c', "n.d.")]),
        record(&[("245", 'a', "No date at all")]),
    ]);
    let output = dir.path().join("years.json");

    let tag_map: TagMap = "260:c=Year".parse().unwrap();
    let mut pipeline = Pipeline::new(tag_map, YearHistogram::new("Year"));
    let report = Ingestor::new(Manifest::from_paths(vec![part])).output(&output).run(&mut pipeline);
    assert!(report.drained());
    assert_eq!(report.records, 5);
    assert_eq!(pipeline.aggregator().failures(), 1);

    assert_eq!(read_json(&output), serde_json::json!({
        "1923": {"Year": "1923", "count": 2},
        "1925": {"Year": "1925", "count": 1},
    }));
}

#[test]
fn keyword_rows_end_to_end() {
    let dir = TempDir::new().unwrap();
    let part = write_part(dir.path(), "maps.xml.gz", &[
        record(&[("245", 'a', "Floods of the Ohio valley"), ("260", 'c', "1937."), ("752", 'a', "Ohio")]),
        record(&[("245", 'a', "County atlas"), ("650", 'a', "Earthquakes"), ("752", 'a', "California")]),
        record(&[("245", 'a', "Fire insurance map")]),
        record(&[("245", 'a', "Road map"), ("752", 'a', "Kansas")]),
        record(&[("245", 'a', "Flood plain survey"), ("260", 'c', "n.d."), ("752", 'a', "Iowa")]),
    ]);
    let output = dir.path().join("hazards.tsv");

    let tag_map: TagMap = "245:*=Title; 260:c=Year; 752:*=Location; 650:a=Subject".parse().unwrap();
    let rows = RowList::new(
        vec![
            Column::Joined("Title".to_string()),
            Column::Year("Year".to_string()),
            Column::Joined("Location".to_string()),
        ],
        requires(&["Title", "Location"], true));
    let mut pipeline = Pipeline::new(tag_map, rows)
        .matching(Matcher::new(MatchPolicy::Tokenized, &["flood", "fire", "earthquake"]),
                  MatchScope::Independent(vec!["Title".to_string(), "Subject".to_string()]));
    let report = Ingestor::new(Manifest::from_paths(vec![part])).output(&output).run(&mut pipeline);
    assert!(report.drained());

    // No 260 in the atlas and no year in the survey's, so both leave the year empty
    assert_eq!(pipeline.aggregator().failures(), 1);
    assert_eq!(fs::read_to_string(&output).unwrap(),
        "Floods of the Ohio valley\t1937\tOhio\nCounty atlas\t\tCalifornia\nFlood plain survey\t\tIowa");
}
