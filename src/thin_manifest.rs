// src/thin_manifest.rs

//! Optional conversion of Manifest blobs to thin Manifests.
//!
//! Once history lives in git, only the `DIST` entries of a Manifest carry
//! information git does not already have. Every Manifest written by a commit
//! is fetched from the object store, reduced to its `DIST` entries without the
//! legacy `MD5`/`RMD160`/`SHA1` checksums, and stored again.

use crate::error::{Error, Result};
use crate::model::{CommitRecord, FileOpKind};
use git2::{Oid, Repository};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

const LEGACY_CHECKSUMS: [&str; 3] = ["MD5", "RMD160", "SHA1"];

/// Entry types covered by the repository itself
const REDUNDANT_ENTRIES: [&str; 3] = ["EBUILD", "AUX", "MISC"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("object store lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest is not UTF-8")]
    Encoding,

    #[error("Manifest line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Content-addressed blob storage the rewritten Manifests go to
pub trait ObjectStore: Send + Sync {
    fn fetch_object(&self, id: &str) -> std::result::Result<Vec<u8>, StoreError>;

    /// Stores `data` and returns its object id. `path_hint` names the file
    /// the blob belongs to.
    fn store_object(&self, data: &[u8], path_hint: &str) -> std::result::Result<String, StoreError>;
}

/// Object store backed by the odb of a git repository
pub struct GitObjectStore {
    repo: Mutex<Repository>,
}

impl GitObjectStore {
    pub fn open(path: &Path) -> Result<GitObjectStore> {
        Ok(GitObjectStore { repo: Mutex::new(Repository::open(path)?) })
    }
}

impl ObjectStore for GitObjectStore {
    fn fetch_object(&self, id: &str) -> std::result::Result<Vec<u8>, StoreError> {
        let repo = self.repo.lock().map_err(|_| StoreError::Poisoned)?;
        let oid = Oid::from_str(id)?;
        let blob = repo.find_blob(oid).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound => StoreError::NotFound(id.to_string()),
            _ => StoreError::Git(e),
        })?;
        Ok(blob.content().to_vec())
    }

    fn store_object(&self, data: &[u8], _path_hint: &str) -> std::result::Result<String, StoreError> {
        let repo = self.repo.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(repo.blob(data)?.to_string())
    }
}

/// Thin version of a Manifest, or `None` when it is signed or already thin
pub fn thin_manifest(content: &[u8]) -> std::result::Result<Option<Vec<u8>>, ManifestError> {
    let text = std::str::from_utf8(content).map_err(|_| ManifestError::Encoding)?;
    if text.contains("-----BEGIN PGP SIGNED MESSAGE-----") {
        return Ok(None);
    }

    let mut thin = String::with_capacity(text.len());
    for (i, line) in text.lines().enumerate() {
        let malformed = |reason: &str| ManifestError::Malformed { line: i + 1, reason: reason.to_string() };
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&kind) = fields.first() else {
            continue;
        };
        // Manifest1 entries and redundant Manifest2 entries go away entirely
        if LEGACY_CHECKSUMS.contains(&kind) || kind == "SHA256" || REDUNDANT_ENTRIES.contains(&kind) {
            continue;
        }
        if kind != "DIST" {
            return Err(malformed("unknown entry type"));
        }
        if fields.len() < 5 || (fields.len() - 3) % 2 != 0 {
            return Err(malformed("expected DIST <file> <size> (<hash> <digest>)+"));
        }
        if fields[2].parse::<u64>().is_err() {
            return Err(malformed("bad size"));
        }
        let checksums: Vec<&[&str]> = fields[3..]
            .chunks(2)
            .filter(|pair| !LEGACY_CHECKSUMS.contains(&pair[0]))
            .collect();
        if checksums.is_empty() {
            return Err(malformed("no checksum left"));
        }
        thin.push_str(&fields[..3].join(" "));
        for pair in checksums {
            thin.push(' ');
            thin.push_str(&pair.join(" "));
        }
        thin.push('\n');
    }

    if thin == text {
        return Ok(None);
    }
    Ok(Some(thin.into_bytes()))
}

fn is_manifest(path: &str) -> bool {
    path == "Manifest" || path.ends_with("/Manifest")
}

fn valid_object_id(id: &str) -> bool {
    id.len() == 40 && id.chars().all(|c| c.is_ascii_hexdigit())
}

struct Task {
    record: usize,
    path: String,
    id: String,
}

/// Rewrites the Manifest blob of one op. Store and content problems leave the
/// op alone; only a malformed id from the store is fatal.
fn rewrite_one(store: &dyn ObjectStore, task: &Task) -> Result<Option<String>> {
    let content = match store.fetch_object(&task.id) {
        Ok(content) => content,
        Err(e) => {
            warn!("keeping {} ({}): {}", task.path, task.id, e);
            return Ok(None);
        }
    };
    let thin = match thin_manifest(&content) {
        Ok(Some(thin)) => thin,
        Ok(None) => return Ok(None),
        Err(e) => {
            warn!("keeping {} ({}): {}", task.path, task.id, e);
            return Ok(None);
        }
    };
    let id = match store.store_object(&thin, &task.path) {
        Ok(id) => id,
        Err(e) => {
            warn!("keeping {} ({}): {}", task.path, task.id, e);
            return Ok(None);
        }
    };
    if !valid_object_id(&id) {
        return Err(Error::ObjectStore { reason: format!("stored {} as {:?}", task.path, id) });
    }
    Ok(Some(id))
}

/// Replaces every Manifest written by `records` with its thin version
pub fn rewrite_manifests(
    records: Vec<CommitRecord>,
    store: &dyn ObjectStore,
    jobs: Option<usize>,
) -> Result<Vec<CommitRecord>> {
    let tasks: Vec<Task> = records
        .iter()
        .enumerate()
        .flat_map(|(idx, record)| {
            record.files.iter().filter_map(move |(path, op)| match op.kind {
                FileOpKind::Modify if is_manifest(path) => {
                    op.object_id().map(|id| Task { record: idx, path: path.clone(), id: id.to_string() })
                }
                _ => None,
            })
        })
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()?;
    let bar = ProgressBar::new(tasks.len() as u64);
    bar.set_message("Thinning Manifests");
    let new_ids: Vec<Option<String>> = pool.install(|| {
        tasks
            .par_iter()
            .progress_with(bar.clone())
            .map(|task| rewrite_one(store, task))
            .collect::<Result<_>>()
    })?;
    bar.finish_with_message("Manifests thinned");

    let mut records = records;
    let mut rewritten = 0;
    for (task, id) in tasks.iter().zip(new_ids) {
        let Some(id) = id else {
            continue;
        };
        let record = &records[task.record];
        let mut files = record.files.clone();
        if let Some(op) = files.get_mut(&task.path) {
            *op = op.with_object_id(&id);
        }
        records[task.record] = record.with_files(files);
        rewritten += 1;
    }
    info!("Rewrote {} of {} Manifests", rewritten, tasks.len());
    Ok(records)
}
