//! Example 4: Word cooccurrence network
//!
//! Runs through a collection (BooksAll by default, which takes a while) looking for titles
//! that mention at least two words from a newline separated word list, say a list of animals.
//! Words are compared after singularizing, so "frogs" counts as "frog".
//!
//! The output is a sigma.js style network: one node per word (its size is the number of titles
//! that mention it alongside another listed word) and one edge per pair of words that ever
//! share a title. Node positions are random placeholders for the viewer to lay out.

// argument parsing
#[macro_use] extern crate clap;
// logging
#[macro_use] extern crate log;
extern crate env_logger;
// lastly, this library
extern crate marcflow;

use std::process;
use marcflow::errors::*;
use marcflow::aggregate::{CoOccurrenceGraph, Placement};
use marcflow::ingest::{collection_manifest, Ingestor, OpenFailurePolicy, Pipeline};
use marcflow::marc::TagMap;
use marcflow::matching::{read_wordlist, Matcher, MatchPolicy, MatchScope};

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
        .arg_from_usage("<wordlist> 'file containing words to look for, one per line'")
        .arg_from_usage("--data [dir] 'directory holding the downloaded part files (default: data)'")
        .arg_from_usage("--collection [name] 'which collection to read (default: BooksAll)'")
        .arg_from_usage("--edition [year] 'edition in the file names (default: 2014)'")
        .arg_from_usage("--tags [map] 'tag map; must produce a Title field'")
        .arg_from_usage("--seed [n] 'seed for the placeholder node positions (default: 1)'")
        .arg_from_usage("--output [file] 'where to write the network (default: out/<wordlist>_network.json)'")
        .arg_from_usage("--halt-on-missing 'stop instead of skipping parts that are missing'")
        .get_matches();

    let wordlist = args.value_of("wordlist").unwrap();
    let words = read_wordlist(wordlist)?;
    let collection = args.value_of("collection").unwrap_or("BooksAll");
    let manifest = collection_manifest(
        args.value_of("data").unwrap_or("data"),
        collection,
        args.value_of("edition").unwrap_or("2014"))?;
    let tag_map: TagMap = args.value_of("tags").unwrap_or(DEFAULT_TAGS).parse()?;
    let seed = if args.is_present("seed") {
        value_t!(args, "seed", u64).unwrap_or_else(|e| e.exit())
    } else {
        1
    };
    let output = args.value_of("output")
        .map(|o| o.to_string())
        .unwrap_or_else(|| {
            let stem = ::std::path::Path::new(wordlist)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "words".to_string());
            format!("out/{}_network.json", stem)
        });

    info!("Collecting cooccurrences (with one another) of {} words", words.len());
    let mut pipeline = Pipeline::new(tag_map, CoOccurrenceGraph::new(Placement::Random { seed: seed }))
        .matching(Matcher::new(MatchPolicy::Tokenized, &words),
                  MatchScope::Concatenated(vec!["Title".to_string()]));
    let mut ingestor = Ingestor::new(manifest)
        .output(output)
        .on_open_failure(if args.is_present("halt-on-missing") {
            OpenFailurePolicy::Halt
        } else {
            OpenFailurePolicy::Skip
        });
    let report = ingestor.run(&mut pipeline);
    let graph = pipeline.aggregator();
    info!("Network has {} nodes and {} edges after {} records",
        graph.nodes().len(), graph.edges().len(), report.records);
    Ok(report.drained())
}
