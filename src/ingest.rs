//! Run a pipeline over every file of a collection, one file at a time
//!
//! The Library of Congress dumps come as `{prefix}.{edition}.partNN.xml.gz`, numbered from 01.
//! Each file is streamed through the decoder and every record goes through the pipeline
//! (project → match → aggregate). When a file is done the aggregator's whole state is written
//! out, replacing the previous snapshot, and the next file is opened. If a run dies halfway
//! through a file, the output on disk is still complete up to the file before.
use std::fs;
use std::path::{Path, PathBuf};
use aggregate::{Aggregator, Snapshot};
use marc::{project, RawRecord, TagMap};
use marcxml::open_source;
use matching::{Matcher, MatchResult, MatchScope};
use errors::*;

/// How many part files each collection of the 2014 dump has
pub const COLLECTIONS: &'static [(&'static str, usize)] = &[
    ("BooksAll", 41),
    ("Computer.Files", 1),
    ("Maps", 1),
    ("Music", 1),
    ("Names", 37),
    ("Serials", 11),
    ("Subjects", 2),
    ("Visual.Materials", 1),
];

pub fn collection_size(prefix: &str) -> Option<usize> {
    COLLECTIONS.iter().find(|&&(name, _)| name == prefix).map(|&(_, count)| count)
}

/// Every part of a known collection
pub fn collection_manifest<P: AsRef<Path>>(dir: P, prefix: &str, edition: &str) -> Result<Manifest> {
    match collection_size(prefix) {
        Some(count) => Ok(Manifest::collection(dir, prefix, edition, count)),
        None => {
            let known: Vec<&str> = COLLECTIONS.iter().map(|&(name, _)| name).collect();
            Err(Error::Other(format!("Unknown collection {:?}, expected one of {}",
                prefix, known.join(", "))))
        }
    }
}

/// File name of one part, `part` counting from 1
pub fn part_name(prefix: &str, edition: &str, part: usize) -> String {
    format!("{}.{}.part{:02}.xml.gz", prefix, edition, part)
}

/// The ordered list of files for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    sources: Vec<PathBuf>,
}

impl Manifest {
    /// Parts 1 through `count` of a collection, in `dir`
    pub fn collection<P: AsRef<Path>>(dir: P, prefix: &str, edition: &str, count: usize) -> Self {
        let dir = dir.as_ref();
        Manifest {
            sources: (1..count + 1).map(|part| dir.join(part_name(prefix, edition, part))).collect(),
        }
    }

    pub fn from_paths<P: Into<PathBuf>>(paths: Vec<P>) -> Self {
        Manifest { sources: paths.into_iter().map(|p| p.into()).collect() }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, cursor: usize) -> Option<&Path> {
        self.sources.get(cursor).map(|p| p.as_path())
    }
}

/// Where the ingestor is. The usize is the manifest cursor (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Idle,
    LoadingFile(usize),
    StreamingRecords(usize),
    FileComplete(usize),
    /// Every file in the manifest was handled
    Drained,
    Failed,
}

/// What to do when a manifest entry can't be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailurePolicy {
    /// Log it, remember it in the report and move on to the next file
    Skip,
    /// Stop the run
    Halt,
}

/// Opens one source file as a stream of records
pub trait RecordSource {
    fn open(&mut self, path: &Path) -> Result<Box<dyn Iterator<Item = Result<RawRecord>>>>;
}

/// Gzipped (or plain) MARC-XML files on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct MarcXmlFiles;

impl RecordSource for MarcXmlFiles {
    fn open(&mut self, path: &Path) -> Result<Box<dyn Iterator<Item = Result<RawRecord>>>> {
        Ok(Box::new(open_source(path)?))
    }
}

/// Receives every record of the run, and is asked for its state after each file
pub trait RecordHandler {
    fn handle(&mut self, record: &RawRecord);
    fn snapshot(&self) -> Result<Snapshot>;
}

/// Tag map → optional matching → aggregator
pub struct Pipeline<A> {
    tag_map: TagMap,
    matching: Option<(Matcher, MatchScope)>,
    aggregator: A,
}

impl<A: Aggregator> Pipeline<A> {
    /// Without `matching`, every record is passed on as matched
    pub fn new(tag_map: TagMap, aggregator: A) -> Self {
        if tag_map.is_empty() {
            warn!("The tag map is empty, so every record will be skipped");
        }
        Pipeline { tag_map: tag_map, matching: None, aggregator: aggregator }
    }

    pub fn matching(mut self, matcher: Matcher, scope: MatchScope) -> Self {
        self.matching = Some((matcher, scope));
        self
    }

    pub fn aggregator(&self) -> &A {
        &self.aggregator
    }

    pub fn into_aggregator(self) -> A {
        self.aggregator
    }
}

impl<A: Aggregator> RecordHandler for Pipeline<A> {
    fn handle(&mut self, record: &RawRecord) {
        let extracted = project(record, &self.tag_map);
        if extracted.is_empty() {
            return;
        }
        let matched = match self.matching {
            Some((ref matcher, ref scope)) => scope.check(matcher, &extracted),
            None => MatchResult::unconditional(),
        };
        self.aggregator.ingest(&extracted, &matched);
    }

    fn snapshot(&self) -> Result<Snapshot> {
        self.aggregator.flush()
    }
}

/// Replace `path` with the rendered snapshot
///
/// The bytes go to a sibling `.partial` file first and are then renamed over the target, so a
/// reader sees either the old snapshot or the new one.
pub fn write_snapshot<P: AsRef<Path>>(path: P, snapshot: &Snapshot) -> Result<usize> {
    let path = path.as_ref();
    let bytes = snapshot.render()?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);
    fs::write(&partial, &bytes)?;
    if let Err(err) = fs::rename(&partial, path) {
        if let Err(cleanup) = fs::remove_file(&partial) {
            warn!("Could not remove {}: {}", partial.display(), cleanup);
        }
        return Err(err.into());
    }
    Ok(bytes.len())
}

#[derive(Debug)]
pub enum FileOutcome {
    Complete,
    Skipped(Error),
    Failed(Error),
}

#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub records: usize,
    pub outcome: FileOutcome,
}

/// How a run went
#[derive(Debug)]
pub struct IngestReport {
    pub files: Vec<FileReport>,
    pub records: usize,
    /// `Drained` or `Failed`
    pub state: IngestState,
}

impl IngestReport {
    pub fn drained(&self) -> bool {
        self.state == IngestState::Drained
    }

    pub fn skipped(&self) -> Vec<&Path> {
        self.files.iter()
            .filter(|f| match f.outcome { FileOutcome::Skipped(_) => true, _ => false })
            .map(|f| f.path.as_path())
            .collect()
    }
}

/// Walks a manifest strictly in order, one open file at a time
pub struct Ingestor<S = MarcXmlFiles> {
    manifest: Manifest,
    output: Option<PathBuf>,
    on_open_failure: OpenFailurePolicy,
    source: S,
    state: IngestState,
    transitions: Vec<IngestState>,
}

impl Ingestor<MarcXmlFiles> {
    pub fn new(manifest: Manifest) -> Self {
        Ingestor::with_source(manifest, MarcXmlFiles)
    }
}

impl<S: RecordSource> Ingestor<S> {
    pub fn with_source(manifest: Manifest, source: S) -> Self {
        Ingestor {
            manifest: manifest,
            output: None,
            on_open_failure: OpenFailurePolicy::Skip,
            source: source,
            state: IngestState::Idle,
            transitions: vec![],
        }
    }

    /// Write the handler's snapshot here after every file
    pub fn output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn on_open_failure(mut self, policy: OpenFailurePolicy) -> Self {
        self.on_open_failure = policy;
        self
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    /// Every state the ingestor has been through, in order
    pub fn transitions(&self) -> &[IngestState] {
        &self.transitions
    }

    fn enter(&mut self, state: IngestState) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
        self.transitions.push(state);
    }

    /// Stream every file of the manifest through `handler`
    pub fn run<H: RecordHandler>(&mut self, handler: &mut H) -> IngestReport {
        let mut files = vec![];
        let mut total = 0;
        let mut cursor = 0;
        let output = self.output.clone();
        self.transitions.clear();
        self.state = IngestState::Idle;
        self.transitions.push(IngestState::Idle);

        loop {
            let path = match self.manifest.get(cursor) {
                Some(path) => path.to_path_buf(),
                None => {
                    self.enter(IngestState::Drained);
                    info!("Finished all {} files, {} records", self.manifest.len(), total);
                    break;
                }
            };

            self.enter(IngestState::LoadingFile(cursor));
            info!("Loading file {} ({}/{})", path.display(), cursor + 1, self.manifest.len());
            let records = match self.source.open(&path) {
                Ok(records) => records,
                Err(err) => {
                    if self.on_open_failure == OpenFailurePolicy::Skip {
                        warn!("Skipping {}: {}", path.display(), err);
                        files.push(FileReport { path: path, records: 0, outcome: FileOutcome::Skipped(err) });
                        cursor += 1;
                        continue;
                    }
                    error!("Error loading next file {}: {}", path.display(), err);
                    files.push(FileReport { path: path, records: 0, outcome: FileOutcome::Failed(err) });
                    self.enter(IngestState::Failed);
                    break;
                }
            };

            self.enter(IngestState::StreamingRecords(cursor));
            let mut count = 0;
            let mut fatal = None;
            for record in records {
                match record {
                    Ok(record) => {
                        handler.handle(&record);
                        count += 1;
                        total += 1;
                        if total % 250000 == 0 {
                            info!("Finished {} records, {} in {}", total, count, path.display());
                        }
                    }
                    Err(err) => {
                        fatal = Some(err);
                        break;
                    }
                }
            }
            if let Some(err) = fatal {
                // Nothing is flushed, the last snapshot on disk stays as it was
                error!("Giving up on {} after {} records: {}", path.display(), count, err);
                files.push(FileReport { path: path, records: count, outcome: FileOutcome::Failed(err) });
                self.enter(IngestState::Failed);
                break;
            }

            self.enter(IngestState::FileComplete(cursor));
            info!("Parsed {} records from {}", count, path.display());
            if let Some(ref output) = output {
                match handler.snapshot().and_then(|snapshot| write_snapshot(output, &snapshot)) {
                    Ok(bytes) => info!("Saved {} bytes to {}", bytes, output.display()),
                    Err(err) => {
                        error!("Could not save {}: {}", output.display(), err);
                        files.push(FileReport { path: path, records: count, outcome: FileOutcome::Failed(err) });
                        self.enter(IngestState::Failed);
                        break;
                    }
                }
            }
            files.push(FileReport { path: path, records: count, outcome: FileOutcome::Complete });
            cursor += 1;
        }

        IngestReport { files: files, records: total, state: self.state }
    }
}
