//! Example 3: Where and when, for records about hazards
//!
//! Runs through a collection (Maps by default) and finds records whose title or subject
//! mentions one of the keywords (hazard, fire, flood, storm, tornado, earthquake unless others
//! are given). Words are compared after singularizing, so "Floods" counts as "flood".
//! Only records that have both a title and a location (752) are kept.
//!
//! The output is tab separated, one `title<TAB>year<TAB>location` row per record, no header.

// argument parsing
#[macro_use] extern crate clap;
// logging
#[macro_use] extern crate log;
extern crate env_logger;
// lastly, this library
extern crate marcflow;

use std::process;
use marcflow::errors::*;
use marcflow::aggregate::{requires, Column, RowList};
use marcflow::ingest::{collection_manifest, Ingestor, OpenFailurePolicy, Pipeline};
use marcflow::marc::TagMap;
use marcflow::matching::{Matcher, MatchPolicy, MatchScope};

const DEFAULT_TAGS: &'static str = "245:*=Title; 260:c=Year; 752:*=Location; 650:a=Subject";
const HAZARDS: &'static [&'static str] = &["hazard", "fire", "flood", "storm", "tornado", "earthquake"];

pub fn main() {
    // Main can't return a Result, and the ? operator needs the enclosing function to return Result
    let drained = inner_main().expect("Could not recover. Exiting.");
    if !drained {
        process::exit(1);
    }
}
pub fn inner_main() -> Result<bool> {
    env_logger::init();
    let args = app_from_crate!()
        .arg_from_usage("[keyword]... 'words to look for in titles and subjects'")
        .arg_from_usage("--data [dir] 'directory holding the downloaded part files (default: data)'")
        .arg_from_usage("--collection [name] 'which collection to read (default: Maps)'")
        .arg_from_usage("--edition [year] 'edition in the file names (default: 2014)'")
        .arg_from_usage("--tags [map] 'tag map; should produce Title, Year, Location and Subject'")
        .arg_from_usage("--output [file] 'where to write the rows (default: out/hazards.tsv)'")
        .arg_from_usage("--halt-on-missing 'stop instead of skipping parts that are missing'")
        .get_matches();

    let keywords: Vec<&str> = args.values_of("keyword")
        .map(|v| v.collect())
        .unwrap_or_else(|| HAZARDS.to_vec());
    let collection = args.value_of("collection").unwrap_or("Maps");
    let manifest = collection_manifest(
        args.value_of("data").unwrap_or("data"),
        collection,
        args.value_of("edition").unwrap_or("2014"))?;
    let tag_map: TagMap = args.value_of("tags").unwrap_or(DEFAULT_TAGS).parse()?;

    let rows = RowList::new(
        vec![
            Column::Joined("Title".to_string()),
            Column::Year("Year".to_string()),
            Column::Joined("Location".to_string()),
        ],
        requires(&["Title", "Location"], true));
    let mut pipeline = Pipeline::new(tag_map, rows)
        .matching(Matcher::new(MatchPolicy::Tokenized, &keywords),
                  MatchScope::Independent(vec!["Title".to_string(), "Subject".to_string()]));
    let mut ingestor = Ingestor::new(manifest)
        .output(args.value_of("output").unwrap_or("out/hazards.tsv"))
        .on_open_failure(if args.is_present("halt-on-missing") {
            OpenFailurePolicy::Halt
        } else {
            OpenFailurePolicy::Skip
        });
    let report = ingestor.run(&mut pipeline);
    let rows = pipeline.aggregator();
    info!("Kept {} of {} records; {} dates had no year in them",
        rows.rows().len(), report.records, rows.failures());
    Ok(report.drained())
}
