//! Example 0: Print every title in one file
//!
//! Streams a single MARC-XML file (gzipped or not) and prints the title (all subfields of 245,
//! joined with spaces) of each record, one per line. A quick way to check that a download is
//! readable before starting a long batch run.

// argument parsing
#[macro_use] extern crate clap;
// logging
#[macro_use] extern crate log;
extern crate env_logger;
// lastly, this library
extern crate marcflow;

use std::io::{self, Write};
use marcflow::errors::*;
use marcflow::marc::{project, TagMap};
use marcflow::marcxml::open_source;

const DEFAULT_TAGS: &'static str = "245:*=Title";

pub fn main() {
    // Main can't return a Result, and the ? operator needs the enclosing function to return Result
    inner_main().expect("Could not recover. Exiting.");
}
pub fn inner_main() -> Result<()> {
    env_logger::init();
    let args = app_from_crate!()
        .arg_from_usage("<input> 'MARC-XML file to read (.gz is decompressed on the fly)'")
        .arg_from_usage("--tags [map] 'tag map, like \"245:*=Title\"; the Title field is printed'")
        .get_matches();

    let tag_map: TagMap = args.value_of("tags").unwrap_or(DEFAULT_TAGS).parse()?;
    let input = args.value_of("input").unwrap();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut streamer = open_source(input)?;
    for record in streamer.by_ref() {
        let extracted = project(&record?, &tag_map);
        if let Some(title) = extracted.joined("Title", " ") {
            writeln!(out, "{}", title)?;
        }
    }
    info!("Finished parsing {}: {} records, {} unreadable",
        input, streamer.decoded(), streamer.skipped());
    Ok(())
}
