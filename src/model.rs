// src/model.rs

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Trailer keys produced by the message mangler. Lines carrying one of these
/// are ignored when comparing commit messages.
pub const KNOWN_TRAILERS: [&str; 3] = ["Package-Manager", "RepoMan-Options", "Manifest-Sign-Key"];

/// Kind of a single file operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpKind {
    Modify,
    Delete,
}

/// A file operation, kept as the literal wire line it will be written back as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOp {
    pub kind: FileOpKind,
    pub raw: String,
}

impl FileOp {
    pub fn modify(raw: impl Into<String>) -> Self {
        FileOp { kind: FileOpKind::Modify, raw: raw.into() }
    }

    pub fn delete(raw: impl Into<String>) -> Self {
        FileOp { kind: FileOpKind::Delete, raw: raw.into() }
    }

    /// Object id of a modify op (`M <mode> <id> <path>`)
    pub fn object_id(&self) -> Option<&str> {
        match self.kind {
            FileOpKind::Modify => self.raw.splitn(4, ' ').nth(2),
            FileOpKind::Delete => None,
        }
    }

    /// Same op pointing at another object. Delete ops are returned unchanged.
    pub fn with_object_id(&self, id: &str) -> FileOp {
        let mut parts = self.raw.splitn(4, ' ');
        match (self.kind, parts.next(), parts.next(), parts.next(), parts.next()) {
            (FileOpKind::Modify, Some(op), Some(mode), Some(_), Some(path)) => {
                FileOp::modify(format!("{} {} {} {}", op, mode, id, path))
            }
            _ => self.clone(),
        }
    }
}

/// Maps a normalized path to the operation applied to it
pub type FileMap = BTreeMap<String, FileOp>;

/// One commit of the history. Records are values: merging returns a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub author: String,
    pub timestamp: i64,
    message: String,
    footerless: Vec<String>,
    pub files: FileMap,
}

impl CommitRecord {
    pub fn new(author: impl Into<String>, timestamp: i64, message: impl Into<String>, files: FileMap) -> Self {
        let message = message.into();
        let footerless = footerless_message(&message);
        CommitRecord { author: author.into(), timestamp, message, footerless, files }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Message lines without the known trailers
    pub fn footerless_message(&self) -> &[String] {
        &self.footerless
    }

    pub fn with_files(&self, files: FileMap) -> Self {
        CommitRecord { files, ..self.clone() }
    }

    /// Disjoint union of both file maps, keeping this record's metadata.
    /// Any shared path is an integrity error.
    pub fn safe_combine(&self, other: &CommitRecord) -> Result<CommitRecord> {
        let shared: Vec<String> = other
            .files
            .keys()
            .filter(|path| self.files.contains_key(*path))
            .cloned()
            .collect();
        if !shared.is_empty() {
            return Err(Error::OverlappingFiles {
                timestamp: self.timestamp,
                author: self.author.clone(),
                paths: shared,
            });
        }
        Ok(self.update_files(other))
    }

    /// Union of both file maps where `other` wins on a shared path
    pub fn update_files(&self, other: &CommitRecord) -> CommitRecord {
        let mut files = self.files.clone();
        files.extend(other.files.iter().map(|(path, op)| (path.clone(), op.clone())));
        self.with_files(files)
    }
}

pub fn footerless_message(message: &str) -> Vec<String> {
    message
        .lines()
        .filter(|line| {
            let key = line.split(':').next().unwrap_or_default();
            !KNOWN_TRAILERS.contains(&key)
        })
        .map(String::from)
        .collect()
}

/// POSIX style normalization: collapses separators, drops `.` and resolves `..`.
/// Returns `None` when the path climbs out of its root or ends up empty.
pub fn normalize_path(path: &str) -> Option<String> {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            _ => parts.push(part),
        }
    }
    if parts.is_empty() {
        return None;
    }
    let joined = parts.join("/");
    Some(if absolute { format!("/{}", joined) } else { joined })
}

/// Everything before the last `/`, or "" for a bare file name
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}
