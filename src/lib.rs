//! Helper functions for the example MARC catalog programs
//!
//! This code is intended to reduce the boilerplate in the included binaries, which all stream
//! the Library of Congress MARC-XML dumps part by part, pull a few fields out of each record,
//! check them for some words and count what they find. But if you do use it elsewhere, the
//! pieces are: `marc` (tag maps and projection), `marcxml` (the streaming decoder), `matching`,
//! `aggregate` and `ingest` (which ties them together).


#[macro_use] extern crate log;
#[macro_use] extern crate serde_derive;
#[cfg_attr(test, macro_use)] extern crate serde_json;
extern crate serde;
extern crate nom;
extern crate flate2;
extern crate regex;
extern crate rand;
extern crate farmhash;
extern crate hash_hasher;
extern crate unicode_segmentation;
#[cfg(test)] extern crate tempfile;
pub mod errors;
pub mod farm;
pub mod marc;
pub mod marcxml;
pub mod matching;
pub mod aggregate;
pub mod ingest;
