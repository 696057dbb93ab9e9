//! Streaming MARC-XML record decoder
//!
//! This is not an XML parser. It frames `<record>` elements out of a byte stream, then reads the
//! datafields and subfields inside each one with a handful of nom combinators. Leaders,
//! controlfields, comments and anything outside a record are skipped. Catalog dumps break now
//! and then, so a record that won't parse is logged and skipped rather than ending the stream.
use std::fs::File;
use std::io::{self, Read, BufReader};
use std::path::Path;
use flate2::read::MultiGzDecoder;
use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_till, take_until, take_while1};
use nom::character::complete::{char as chr, multispace0, multispace1};
use nom::combinator::{map, opt, recognize};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, separated_pair, tuple};
use nom::bytes::streaming::take_while1 as streaming_take_while1;
use marc::{DataField, RawRecord, Subfield};
use errors::*;

/// Largest record we are willing to buffer
const SIZE_LIMIT: usize = 1 << 20;
const CHUNK: usize = 1 << 16;

/// Stream records from any reader (a gzip decoder, most of the time)
pub struct MarcXmlStreamer<R> {
    source: String,
    reader: R,
    buf: Vec<u8>,
    /// Where to resume looking for the closing tag of the record at the front of the buffer
    close_from: usize,
    eof: bool,
    done: bool,
    decoded: usize,
    skipped: usize,
}

/// Open a source file, decompressing on the fly if it ends in `.gz`
pub fn open_source<P: AsRef<Path>>(path: P) -> Result<MarcXmlStreamer<Box<dyn Read>>> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let file = File::open(path)
        .map_err(|err| Error::MissingFile(name.clone(), Some(err)))?;
    let is_gzip = path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    let reader: Box<dyn Read> = if is_gzip {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(MarcXmlStreamer::new(name, reader))
}

impl<R: Read> MarcXmlStreamer<R> {
    /// `source` is only used to name the stream in log messages and errors
    pub fn new<S: Into<String>>(source: S, reader: R) -> Self {
        MarcXmlStreamer {
            source: source.into(),
            reader: reader,
            buf: Vec::with_capacity(CHUNK),
            close_from: 0,
            eof: false,
            done: false,
            decoded: 0,
            skipped: 0,
        }
    }

    /// Records handed out so far
    pub fn decoded(&self) -> usize { self.decoded }

    /// Records that were found but could not be read
    pub fn skipped(&self) -> usize { self.skipped }

    /// Read one more chunk into the buffer
    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; CHUNK];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => { self.eof = true; return Ok(()); }
                Ok(n) => { self.buf.extend_from_slice(&chunk[..n]); return Ok(()); }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Cut the next complete `<record>` element out of the buffer
    fn next_fragment(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            let (open_end, self_closing, closing) = match find_open(&self.buf) {
                Scan::Found { start, open_end, self_closing, name } => {
                    if start > 0 {
                        self.buf.drain(..start);
                        self.close_from = 0;
                    }
                    let mut closing = b"</".to_vec();
                    closing.extend_from_slice(&name);
                    closing.push(b'>');
                    (open_end - start, self_closing, closing)
                }
                Scan::Partial(start) => {
                    self.buf.drain(..start);
                    self.close_from = 0;
                    if self.eof { return Ok(None); }
                    if self.buf.len() >= SIZE_LIMIT {
                        warn!("In a bind! Trashing an opening tag longer than {} bytes in {}",
                            SIZE_LIMIT, self.source);
                        self.skipped += 1;
                        self.buf.clear();
                    }
                    self.fill()?;
                    continue;
                }
                Scan::Nothing => {
                    self.buf.clear();
                    self.close_from = 0;
                    if self.eof { return Ok(None); }
                    self.fill()?;
                    continue;
                }
            };

            if self_closing {
                let fragment = self.buf.drain(..open_end).collect();
                self.close_from = 0;
                return Ok(Some(fragment));
            }

            let from = ::std::cmp::max(open_end, self.close_from);
            if let Some(offset) = find_bytes(&self.buf[from..], &closing) {
                let end = from + offset + closing.len();
                let fragment = self.buf.drain(..end).collect();
                self.close_from = 0;
                return Ok(Some(fragment));
            }

            if self.eof {
                warn!("{} ends in the middle of a record, dropping the last {} bytes",
                    self.source, self.buf.len());
                self.buf.clear();
                return Ok(None);
            }
            if self.buf.len() >= SIZE_LIMIT {
                // The buffer is full but the record is incomplete.
                // Skip past this opening tag and look for the next one.
                warn!("In a bind! Trashing a record that wants more than {} bytes in {}",
                    SIZE_LIMIT, self.source);
                self.skipped += 1;
                self.buf.drain(..1);
                self.close_from = 0;
                continue;
            }
            self.close_from = self.buf.len().saturating_sub(closing.len());
            self.fill()?;
        }
    }
}

impl<R: Read> Iterator for MarcXmlStreamer<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.next_fragment() {
                Ok(Some(fragment)) => {
                    match parse_record(&String::from_utf8_lossy(&fragment)) {
                        Ok(record) => {
                            self.decoded += 1;
                            return Some(Ok(record));
                        }
                        Err(reason) => {
                            self.skipped += 1;
                            warn!("Skipping unreadable record #{} in {}: {}",
                                self.decoded + self.skipped, self.source, reason);
                        }
                    }
                }
                Ok(None) => { self.done = true; }
                Err(err) => {
                    self.done = true;
                    return Some(Err(Error::Decode(self.source.clone(), err)));
                }
            }
        }
        None
    }
}

//
// Framing
//

enum Scan {
    /// A complete opening tag of a record element
    Found { start: usize, open_end: usize, self_closing: bool, name: Vec<u8> },
    /// Might be a record opening tag, but it runs off the end of the buffer
    Partial(usize),
    Nothing,
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.' || b == b':'
}

fn element_name(input: &[u8]) -> IResult<&[u8], &[u8]> {
    streaming_take_while1(is_name_byte)(input)
}

/// The part of a (possibly prefixed) name after the colon
fn local_bytes(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(colon) => &name[colon + 1..],
        None => name,
    }
}

fn find_open(buf: &[u8]) -> Scan {
    let mut from = 0;
    while let Some(offset) = buf[from..].iter().position(|&b| b == b'<') {
        let start = from + offset;
        match element_name(&buf[start + 1..]) {
            Err(nom::Err::Incomplete(_)) => return Scan::Partial(start),
            Ok((_, name)) if local_bytes(name) == b"record" => {
                return match buf[start..].iter().position(|&b| b == b'>') {
                    Some(gt) => Scan::Found {
                        start: start,
                        open_end: start + gt + 1,
                        self_closing: buf[start + gt - 1] == b'/',
                        name: name.to_vec(),
                    },
                    None => Scan::Partial(start),
                };
            }
            _ => from = start + 1,
        }
    }
    Scan::Nothing
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

//
// Reading one record
//

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':')(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(chr('"'), take_till(|c: char| c == '"'), chr('"')),
        delimited(chr('\''), take_till(|c: char| c == '\''), chr('\'')),
    ))(input)
}

fn attribute(input: &str) -> IResult<&str, (&str, &str)> {
    preceded(multispace1,
        separated_pair(name, delimited(multispace0, chr('='), multispace0), quoted))(input)
}

/// `<name attr="value" ...>` or `<name ... />`
fn open_tag(input: &str) -> IResult<&str, (&str, Vec<(&str, &str)>, bool)> {
    map(
        tuple((chr('<'), name, many0(attribute), multispace0, opt(chr('/')), chr('>'))),
        |(_, n, attrs, _, slash, _)| (n, attrs, slash.is_some()),
    )(input)
}

fn close_tag(input: &str) -> IResult<&str, &str> {
    delimited(tag("</"), name, pair(multispace0, chr('>')))(input)
}

/// Comments and processing instructions
fn ignorable(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(tuple((tag("<!--"), take_until("-->"), tag("-->")))),
        recognize(tuple((tag("<?"), take_until("?>"), tag("?>")))),
    ))(input)
}

fn text(input: &str) -> IResult<&str, &str> {
    take_till(|c: char| c == '<')(input)
}

fn local(name: &str) -> &str {
    match name.rfind(':') {
        Some(colon) => &name[colon + 1..],
        None => name,
    }
}

fn attr<'a>(attrs: &[(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    attrs.iter().find(|&&(k, _)| local(k) == key).map(|&(_, v)| v)
}

fn snippet(input: &str) -> String {
    input.chars().take(40).collect()
}

/// Read the datafields of one `<record>` fragment
///
/// Best effort: unclosed datafields are closed at the next datafield or the end of the record
/// and subfields outside a datafield are ignored. Broken tag syntax is an error.
pub fn parse_record(fragment: &str) -> ::std::result::Result<RawRecord, String> {
    let mut input = fragment;
    let mut record = RawRecord::default();
    let mut current: Option<DataField> = None;
    loop {
        input = match text(input) {
            Ok((rest, _)) => rest,
            Err(_) => return Err(format!("unreadable text at {:?}", snippet(input))),
        };
        if input.is_empty() {
            break;
        }
        if let Ok((rest, _)) = ignorable(input) {
            input = rest;
            continue;
        }
        if let Ok((rest, closed)) = close_tag(input) {
            if local(closed) == "datafield" {
                if let Some(datafield) = current.take() {
                    record.fields.push(datafield);
                }
            }
            input = rest;
            continue;
        }
        let (rest, (opened, attrs, self_closing)) = open_tag(input)
            .map_err(|_| format!("malformed tag at {:?}", snippet(input)))?;
        input = rest;
        match local(opened) {
            "datafield" => {
                if let Some(datafield) = current.take() {
                    record.fields.push(datafield);
                }
                let datafield = DataField::new(unescape(attr(&attrs, "tag").unwrap_or("")));
                if self_closing {
                    record.fields.push(datafield);
                } else {
                    current = Some(datafield);
                }
            }
            "subfield" => {
                // A missing code becomes a space, which no tag map can ask for
                let code = attr(&attrs, "code").and_then(|c| c.chars().next()).unwrap_or(' ');
                let value = if self_closing {
                    String::new()
                } else {
                    let (rest, raw) = text(input)
                        .map_err(|_| format!("unreadable subfield at {:?}", snippet(input)))?;
                    let (rest, closed) = close_tag(rest)
                        .map_err(|_| format!("subfield ${} is not closed", code))?;
                    if local(closed) != "subfield" {
                        return Err(format!("subfield ${} closed by </{}>", code, closed));
                    }
                    input = rest;
                    unescape(raw)
                };
                if let Some(ref mut datafield) = current {
                    datafield.subfields.push(Subfield { code: code, text: value });
                }
            }
            _ => {}
        }
    }
    if let Some(datafield) = current.take() {
        record.fields.push(datafield);
    }
    Ok(record)
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ if entity.starts_with("#x") || entity.starts_with("#X") => {
            u32::from_str_radix(&entity[2..], 16).ok().and_then(::std::char::from_u32)
        }
        _ if entity.starts_with('#') => {
            entity[1..].parse::<u32>().ok().and_then(::std::char::from_u32)
        }
        _ => None,
    }
}

/// Replace XML entities. Unknown ones are left as they are.
pub fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
