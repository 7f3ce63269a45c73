// src/dedup.rs

//! Collapsing of commits that cvs2git split or duplicated.
//!
//! Two passes, both stable with respect to input order:
//! - [`manifest_dedup`] runs per source repository, on records in parse order,
//!   and folds Manifest-only recommits into the commit they belong to.
//! - [`simple_dedup`] runs on the merged, timestamp-sorted history and folds
//!   records sharing timestamp, author and footerless message.

use crate::error::Result;
use crate::model::{parent_dir, CommitRecord, FileOpKind};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// How far back a Manifest recommit is matched against earlier commits, in seconds
pub const DEFAULT_MANIFEST_WINDOW: i64 = 5 * 60;

/// Folds records with identical `(timestamp, author, footerless message)`.
///
/// Members of a group are merged in input order and must not share any path;
/// the result keeps the first member's metadata. Groups come out ordered by
/// their first member.
pub fn simple_dedup(records: Vec<CommitRecord>) -> Result<Vec<CommitRecord>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    {
        let mut seen: HashMap<(i64, &str, &[String]), usize> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            let key = (record.timestamp, record.author.as_str(), record.footerless_message());
            match seen.entry(key) {
                Entry::Occupied(group) => groups[*group.get()].push(idx),
                Entry::Vacant(slot) => {
                    slot.insert(groups.len());
                    groups.push(vec![idx]);
                }
            }
        }
    }

    let total = records.len();
    let mut slots: Vec<Option<CommitRecord>> = records.into_iter().map(Some).collect();
    let mut deduped = Vec::with_capacity(groups.len());
    for members in groups {
        let mut members = members.into_iter().filter_map(|idx| slots[idx].take());
        if let Some(first) = members.next() {
            deduped.push(members.try_fold(first, |combined, record| combined.safe_combine(&record))?);
        }
    }
    debug!(before = total, after = deduped.len(), "identity dedup");
    Ok(deduped)
}

/// Directory of the Manifest if `record` is a lone Manifest modification
fn manifest_candidate(record: &CommitRecord) -> Option<&str> {
    if record.files.len() != 1 {
        return None;
    }
    let (path, op) = record.files.iter().next()?;
    if op.kind != FileOpKind::Modify || !path.ends_with("/Manifest") {
        return None;
    }
    Some(parent_dir(path))
}

/// Merges Manifest-only commits into an earlier commit of the same source.
///
/// For each candidate the window is walked backwards one second at a time and
/// the most recent record found decides:
/// - it touches no file in the Manifest's directory: the Manifest is merged into it;
/// - it touches that directory with the same author and footerless message:
///   the Manifest is merged into it;
/// - otherwise another author was working there, and the candidate stays a
///   commit of its own.
///
/// Merges overwrite, so the later Manifest wins.
pub fn manifest_dedup(records: Vec<CommitRecord>, window: i64) -> Vec<CommitRecord> {
    let total = records.len();
    let mut slots: HashMap<i64, Vec<(usize, CommitRecord)>> = HashMap::new();

    for (idx, record) in records.into_iter().enumerate() {
        let absorbed = match manifest_candidate(&record) {
            Some(dir) => absorb_manifest(&mut slots, &record, dir, window),
            None => false,
        };
        if !absorbed {
            slots.entry(record.timestamp).or_default().push((idx, record));
        }
    }

    let mut flattened: Vec<(usize, CommitRecord)> = slots.into_values().flatten().collect();
    flattened.sort_by_key(|(idx, _)| *idx);
    debug!(before = total, after = flattened.len(), "manifest dedup");
    flattened.into_iter().map(|(_, record)| record).collect()
}

fn absorb_manifest(
    slots: &mut HashMap<i64, Vec<(usize, CommitRecord)>>,
    manifest: &CommitRecord,
    manifest_dir: &str,
    window: i64,
) -> bool {
    let floor = (manifest.timestamp - window).max(0);
    for timestamp in (floor + 1..=manifest.timestamp).rev() {
        let Some(bucket) = slots.get_mut(&timestamp) else {
            continue;
        };
        if let Some((_, target)) = bucket.last_mut() {
            let shares_dir = target.files.keys().any(|path| parent_dir(path) == manifest_dir);
            let same_change = target.author == manifest.author
                && target.footerless_message() == manifest.footerless_message();
            if shares_dir && !same_change {
                // someone else touched the package in between
                return false;
            }
            *target = target.update_files(manifest);
            return true;
        }
    }
    false
}
