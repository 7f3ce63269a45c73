// src/ingest.rs

use crate::blob_index::BlobIndex;
use crate::dedup::{manifest_dedup, simple_dedup};
use crate::error::{Error, Result};
use crate::model::CommitRecord;
use crate::parser::CommitParser;
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where cvs2git leaves its output inside a converted repository
#[derive(Debug, Clone)]
pub struct SourceLayout {
    pub tmp_dir: String,
    pub dump_file: String,
    pub blob_index: String,
}

impl Default for SourceLayout {
    fn default() -> Self {
        SourceLayout {
            tmp_dir: "cvs2svn-tmp".into(),
            dump_file: "git-dump.dat".into(),
            blob_index: "git-blob.idx".into(),
        }
    }
}

/// A converted repository with a commit dump to read
#[derive(Debug, Clone)]
pub struct SourceDir {
    pub root: PathBuf,
    pub dump: PathBuf,
    pub blob_index: PathBuf,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Worker threads; `None` uses one per CPU
    pub jobs: Option<usize>,
    /// Manifest recommit lookback in seconds
    pub window: i64,
}

/// Reads one directory per line, ignoring blank lines
pub fn read_dir_list<R: BufRead>(reader: R) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            dirs.push(PathBuf::from(line));
        }
    }
    Ok(dirs)
}

/// Resolves dump locations, skipping directories that have no commit data
pub fn locate_sources(dirs: &[PathBuf], layout: &SourceLayout) -> Vec<SourceDir> {
    let mut sources = Vec::with_capacity(dirs.len());
    for root in dirs {
        let tmp = root.join(&layout.tmp_dir);
        let dump = tmp.join(&layout.dump_file);
        if !dump.exists() {
            warn!("skipping {}; no commit data", root.display());
            continue;
        }
        sources.push(SourceDir { root: root.clone(), dump, blob_index: tmp.join(&layout.blob_index) });
    }
    sources
}

/// Parses one source and folds its Manifest recommits
pub fn ingest_source(source: &SourceDir, window: i64) -> Result<Vec<CommitRecord>> {
    let blobs = BlobIndex::load(&source.blob_index)?;
    let file = File::open(&source.dump).map_err(|e| Error::io(&source.dump, e))?;
    let records = CommitParser::new(BufReader::new(file), &blobs).collect::<Result<Vec<_>>>()?;
    let parsed = records.len();
    let records = manifest_dedup(records, window);
    debug!(
        source = %source.root.display(),
        blobs = blobs.len(),
        parsed,
        kept = records.len(),
        "parsed commit dump"
    );
    Ok(records)
}

/// Parses every source in parallel and merges them into one ordered history
pub fn ingest(sources: &[SourceDir], options: &IngestOptions) -> Result<Vec<CommitRecord>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.unwrap_or(0))
        .build()?;

    let bar = ProgressBar::new(sources.len() as u64);
    bar.set_message("Parsing commit dumps");

    let per_source: Vec<Vec<CommitRecord>> = pool.install(|| {
        sources
            .par_iter()
            .progress_with(bar.clone())
            .map(|source| {
                ingest_source(source, options.window)
                    .map_err(|e| Error::InSource { dir: source.root.clone(), source: Box::new(e) })
            })
            .collect::<Result<_>>()
    })?;
    bar.finish_with_message("Parsing complete");

    merge_sources(per_source)
}

/// Orders the combined history by timestamp and folds identical commits.
///
/// The sort is stable, so commits of one source sharing a timestamp keep
/// their parse order.
pub fn merge_sources(per_source: Vec<Vec<CommitRecord>>) -> Result<Vec<CommitRecord>> {
    let mut records: Vec<CommitRecord> = per_source.into_iter().flatten().collect();
    records.sort_by_key(|record| record.timestamp);
    let total = records.len();
    let records = simple_dedup(records)?;
    info!("Merged {} commits into {}", total, records.len());
    Ok(records)
}

/// Source directories given on the command line, or from stdin when there are none
pub fn source_dirs(args: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if !args.is_empty() {
        return Ok(args.to_vec());
    }
    read_dir_list(std::io::stdin().lock())
}
