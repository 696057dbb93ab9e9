//! MARC records and the tag map that projects them into named fields
//!
//! A tag map says which datafields (by tag) and which of their subfields (by code) we care
//! about, and what to call them. For example:
//!
//! ```text
//! 245:*=Title; 260:c=Year; 650:a=Subject
//! ```
//!
//! stores every subfield of 245 as `Title`, subfield `c` of 260 as `Year` and subfield `a` of
//! 650 as `Subject`. Everything else in the record is dropped.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{take_while1, take_while_m_n};
use nom::character::complete::{char as chr, multispace0, satisfy};
use nom::combinator::{all_consuming, opt};
use nom::multi::separated_list1;
use nom::sequence::{delimited, separated_pair, terminated};
use errors::*;

/// Wildcard subfield code: take every subfield of the tag
pub const ALL_SUBFIELDS: char = '*';

/// One subfield: a single character code and its text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfield {
    pub code: char,
    pub text: String,
}

/// One datafield: a three character tag and its subfields in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataField {
    pub tag: String,
    pub subfields: Vec<Subfield>,
}

impl DataField {
    pub fn new<S: Into<String>>(tag: S) -> Self {
        DataField { tag: tag.into(), subfields: vec![] }
    }

    /// Builder-style subfield append, mostly for tests and fixtures
    pub fn with<S: Into<String>>(mut self, code: char, text: S) -> Self {
        self.subfields.push(Subfield { code: code, text: text.into() });
        self
    }
}

/// A record as it comes out of the decoder. Only datafields are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub fields: Vec<DataField>,
}

impl RawRecord {
    pub fn new(fields: Vec<DataField>) -> Self {
        RawRecord { fields: fields }
    }
}

/// What to do with the subfields of one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubfieldMap {
    /// Every subfield goes to this field, in subfield order, regardless of code
    All(String),
    /// Only these codes are kept, each to its own field
    Codes(BTreeMap<char, String>),
}

/// Tag → subfield code → output field name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    tags: BTreeMap<String, SubfieldMap>,
}

impl TagMap {
    pub fn new() -> Self {
        Default::default()
    }

    /// Map every subfield of `tag` to `field`. Replaces any per-code entries for that tag.
    pub fn all<T: Into<String>, F: Into<String>>(mut self, tag: T, field: F) -> Self {
        self.tags.insert(tag.into(), SubfieldMap::All(field.into()));
        self
    }

    /// Map one subfield code of `tag` to `field`.
    ///
    /// The wildcard code is the same as calling `all`. A tag that is already mapped with the
    /// wildcard ignores further codes.
    pub fn code<T: Into<String>, F: Into<String>>(mut self, tag: T, code: char, field: F) -> Self {
        if code == ALL_SUBFIELDS {
            return self.all(tag, field);
        }
        let entry = self.tags.entry(tag.into())
            .or_insert_with(|| SubfieldMap::Codes(BTreeMap::new()));
        if let SubfieldMap::Codes(ref mut codes) = *entry {
            codes.insert(code, field.into());
        }
        self
    }

    pub fn get(&self, tag: &str) -> Option<&SubfieldMap> {
        self.tags.get(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl fmt::Display for TagMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, (tag, map)) in self.tags.iter().enumerate() {
            if i > 0 { write!(f, "; ")?; }
            write!(f, "{}:", tag)?;
            match *map {
                SubfieldMap::All(ref field) => write!(f, "{}={}", ALL_SUBFIELDS, field)?,
                SubfieldMap::Codes(ref codes) => {
                    for (j, (code, field)) in codes.iter().enumerate() {
                        if j > 0 { write!(f, ",")?; }
                        write!(f, "{}={}", code, field)?;
                    }
                }
            }
        }
        Ok(())
    }
}

//
// Textual tag maps
//

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
    where F: FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn tag_name(input: &str) -> IResult<&str, &str> {
    take_while_m_n(3, 3, |c: char| c.is_ascii_alphanumeric())(input)
}

fn subfield_code(input: &str) -> IResult<&str, char> {
    alt((chr(ALL_SUBFIELDS), satisfy(|c| c.is_ascii_alphanumeric())))(input)
}

fn field_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')(input)
}

fn mapping(input: &str) -> IResult<&str, (char, &str)> {
    separated_pair(ws(subfield_code), chr('='), ws(field_name))(input)
}

fn entry(input: &str) -> IResult<&str, (&str, Vec<(char, &str)>)> {
    separated_pair(ws(tag_name), chr(':'), separated_list1(chr(','), mapping))(input)
}

fn entries(input: &str) -> IResult<&str, Vec<(&str, Vec<(char, &str)>)>> {
    terminated(separated_list1(chr(';'), entry), opt(ws(chr(';'))))(input)
}

impl FromStr for TagMap {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        match all_consuming(entries)(text) {
            Ok((_, parsed)) => {
                let mut map = TagMap::new();
                for (tag, codes) in parsed {
                    for (code, field) in codes {
                        map = map.code(tag, code, field);
                    }
                }
                Ok(map)
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                Err(Error::TagMapSyntax(format!("expected `tag:code=Field` near {:?} in {:?}",
                    e.input.chars().take(20).collect::<String>(), text)))
            }
            Err(nom::Err::Incomplete(_)) => {
                Err(Error::TagMapSyntax(format!("{:?} ends too early", text)))
            }
        }
    }
}

/// Field name → values, in the order they were found
///
/// Multiple subfields or repeated datafields that map to the same field all append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedRecord {
    fields: BTreeMap<String, Vec<String>>,
}

impl ExtractedRecord {
    pub fn push<S: Into<String>>(&mut self, field: &str, value: S) {
        if let Some(values) = self.fields.get_mut(field) {
            values.push(value.into());
            return;
        }
        self.fields.insert(field.to_string(), vec![value.into()]);
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(|v| v.as_slice())
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.get(field).map(|v| !v.is_empty()).unwrap_or(false)
    }

    pub fn first(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(|v| v.first()).map(|s| s.as_str())
    }

    /// All values of a field joined with `sep`
    pub fn joined(&self, field: &str, sep: &str) -> Option<String> {
        self.get(field).map(|v| v.join(sep))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Apply a tag map to one record
pub fn project(record: &RawRecord, tag_map: &TagMap) -> ExtractedRecord {
    let mut extracted = ExtractedRecord::default();
    for datafield in &record.fields {
        match tag_map.get(&datafield.tag) {
            None => continue,
            Some(&SubfieldMap::All(ref field)) => {
                for subfield in &datafield.subfields {
                    extracted.push(field, subfield.text.as_str());
                }
            }
            Some(&SubfieldMap::Codes(ref codes)) => {
                for subfield in &datafield.subfields {
                    if let Some(field) = codes.get(&subfield.code) {
                        extracted.push(field, subfield.text.as_str());
                    }
                }
            }
        }
    }
    extracted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawRecord {
        RawRecord::new(vec![
            DataField::new("100").with('a', "Thorp, Jer"),
            DataField::new("245").with('a', "X").with('b', "Y"),
            DataField::new("260").with('a', "New York :").with('c', "192-"),
            DataField::new("650").with('a', "Foxes").with('x', "Juvenile fiction"),
            DataField::new("650").with('a', "Wolves"),
        ])
    }

    fn sample_map() -> TagMap {
        TagMap::new()
            .all("245", "Title")
            .code("260", 'c', "Year")
            .code("650", 'a', "Subject")
    }

    #[test]
    fn projection_is_deterministic() {
        let record = sample();
        let map = sample_map();
        assert_eq!(project(&record, &map), project(&record, &map));
    }

    #[test]
    fn wildcard_keeps_subfield_order() {
        let extracted = project(&sample(), &sample_map());
        assert_eq!(extracted.get("Title").unwrap(), &["X".to_string(), "Y".to_string()][..]);
    }

    #[test]
    fn unmapped_codes_are_dropped() {
        let extracted = project(&sample(), &sample_map());
        assert_eq!(extracted.get("Year").unwrap(), &["192-".to_string()][..]);
        // 650 $x is not mapped, both 650 $a occurrences append
        assert_eq!(extracted.get("Subject").unwrap(),
            &["Foxes".to_string(), "Wolves".to_string()][..]);
        assert!(extracted.get("Name").is_none());
    }

    #[test]
    fn empty_inputs_give_empty_records() {
        assert!(project(&RawRecord::default(), &sample_map()).is_empty());
        let bare = RawRecord::new(vec![DataField::new("245")]);
        assert!(project(&bare, &sample_map()).is_empty());
    }

    #[test]
    fn wildcard_wins_over_codes() {
        let map = TagMap::new().code("245", 'a', "Short").all("245", "Title").code("245", 'b', "Sub");
        let extracted = project(&sample(), &map);
        assert!(extracted.get("Short").is_none());
        assert!(extracted.get("Sub").is_none());
        assert_eq!(extracted.joined("Title", " ").unwrap(), "X Y");
    }

    #[test]
    fn parses_textual_maps() {
        let map: TagMap = "245:*=Title; 260:c=Year ;650 : a = Subject;".parse().unwrap();
        assert_eq!(map, sample_map());
        let multi: TagMap = "260:a=Place,c=Year".parse().unwrap();
        assert_eq!(multi, TagMap::new().code("260", 'a', "Place").code("260", 'c', "Year"));
    }

    #[test]
    fn display_parses_back() {
        let map = sample_map();
        let again: TagMap = map.to_string().parse().unwrap();
        assert_eq!(map, again);
    }

    #[test]
    fn rejects_bad_maps() {
        assert!("".parse::<TagMap>().is_err());
        assert!("24:*=Title".parse::<TagMap>().is_err());
        assert!("245=Title".parse::<TagMap>().is_err());
        assert!("245:a=".parse::<TagMap>().is_err());
        assert!("245:a=Title 260".parse::<TagMap>().is_err());
    }
}
