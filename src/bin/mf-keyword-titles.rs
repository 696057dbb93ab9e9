//! Example 1: Titles containing a keyword
//!
//! Runs through every part of a collection (BooksAll by default, about 25 million records) and
//! keeps the titles that contain any of the given keywords, as plain case-insensitive
//! substrings. It's a purposely simple example to build on.
//!
//! The output is a JSON list of `{"title": ..., "matches": [...]}`, rewritten after every part.

// argument parsing
#[macro_use] extern crate clap;
// logging
#[macro_use] extern crate log;
extern crate env_logger;
// lastly, this library
extern crate marcflow;

use std::process;
use marcflow::errors::*;
use marcflow::aggregate::TitleList;
use marcflow::ingest::{collection_manifest, Ingestor, OpenFailurePolicy, Pipeline};
use marcflow::marc::TagMap;
use marcflow::matching::{Matcher, MatchPolicy, MatchScope};

const DEFAULT_TAGS: &'static str = "245:*=Title";

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
        .arg_from_usage("[keyword]... 'words to look for in titles (default: monkey)'")
        .arg_from_usage("--data [dir] 'directory holding the downloaded part files (default: data)'")
        .arg_from_usage("--collection [name] 'which collection to read (default: BooksAll)'")
        .arg_from_usage("--edition [year] 'edition in the file names (default: 2014)'")
        .arg_from_usage("--tags [map] 'tag map; must produce a Title field'")
        .arg_from_usage("--output [file] 'where to write the JSON (default: out/output_<collection>.json)'")
        .arg_from_usage("--halt-on-missing 'stop instead of skipping parts that are missing'")
        .get_matches();

    let keywords: Vec<&str> = args.values_of("keyword")
        .map(|v| v.collect())
        .unwrap_or_else(|| vec!["monkey"]);
    let collection = args.value_of("collection").unwrap_or("BooksAll");
    let manifest = collection_manifest(
        args.value_of("data").unwrap_or("data"),
        collection,
        args.value_of("edition").unwrap_or("2014"))?;
    let output = args.value_of("output")
        .map(|o| o.to_string())
        .unwrap_or_else(|| format!("out/output_{}.json", collection));
    let tag_map: TagMap = args.value_of("tags").unwrap_or(DEFAULT_TAGS).parse()?;

    info!("Looking for {:?} in the titles of {} ({} parts)", keywords, collection, manifest.len());
    let mut pipeline = Pipeline::new(tag_map, TitleList::new("Title"))
        .matching(Matcher::new(MatchPolicy::Substring { padded: false }, &keywords),
                  MatchScope::Concatenated(vec!["Title".to_string()]));
    let mut ingestor = Ingestor::new(manifest)
        .output(output)
        .on_open_failure(if args.is_present("halt-on-missing") {
            OpenFailurePolicy::Halt
        } else {
            OpenFailurePolicy::Skip
        });
    let report = ingestor.run(&mut pipeline);
    info!("Found {} titles in {} records", pipeline.aggregator().entries().len(), report.records);
    Ok(report.drained())
}
