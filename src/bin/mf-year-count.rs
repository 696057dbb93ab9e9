//! Example 2: Records per year
//!
//! Runs through a collection (Visual.Materials by default) and counts how many items were
//! published in each year, going by 260 $c. Dates like "192-" count toward 1925; dates with no
//! year at all (like "n.d.") are logged and left out.
//!
//! The output is a JSON object keyed by year: `{"1925": {"Year": "1925", "count": 12}, ...}`.

// argument parsing
#[macro_use] extern crate clap;
// logging
#[macro_use] extern crate log;
extern crate env_logger;
// lastly, this library
extern crate marcflow;

use std::process;
use marcflow::errors::*;
use marcflow::aggregate::YearHistogram;
use marcflow::ingest::{collection_manifest, Ingestor, OpenFailurePolicy, Pipeline};
use marcflow::marc::TagMap;

const DEFAULT_TAGS: &'static str = "260:c=Year";

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
        .arg_from_usage("--data [dir] 'directory holding the downloaded part files (default: data)'")
        .arg_from_usage("--collection [name] 'which collection to read (default: Visual.Materials)'")
        .arg_from_usage("--edition [year] 'edition in the file names (default: 2014)'")
        .arg_from_usage("--tags [map] 'tag map; must produce a Year field'")
        .arg_from_usage("--output [file] 'where to write the JSON (default: out/output_<collection>.json)'")
        .arg_from_usage("--halt-on-missing 'stop instead of skipping parts that are missing'")
        .get_matches();

    let collection = args.value_of("collection").unwrap_or("Visual.Materials");
    let manifest = collection_manifest(
        args.value_of("data").unwrap_or("data"),
        collection,
        args.value_of("edition").unwrap_or("2014"))?;
    let output = args.value_of("output")
        .map(|o| o.to_string())
        .unwrap_or_else(|| format!("out/output_{}.json", collection));
    let tag_map: TagMap = args.value_of("tags").unwrap_or(DEFAULT_TAGS).parse()?;

    let mut pipeline = Pipeline::new(tag_map, YearHistogram::new("Year"));
    let mut ingestor = Ingestor::new(manifest)
        .output(output)
        .on_open_failure(if args.is_present("halt-on-missing") {
            OpenFailurePolicy::Halt
        } else {
            OpenFailurePolicy::Skip
        });
    let report = ingestor.run(&mut pipeline);
    let histogram = pipeline.aggregator();
    info!("Counted {} years from {} records; {} dates had no year in them",
        histogram.counts().len(), report.records, histogram.failures());
    Ok(report.drained())
}
