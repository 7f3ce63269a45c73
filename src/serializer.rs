// src/serializer.rs

use crate::model::CommitRecord;
use std::io::{self, Write};

pub const DEFAULT_TARGET: &str = "refs/heads/master";

/// Number of `progress` lines spread over the output
pub const DEFAULT_PROGRESS_DIVISIONS: usize = 100;

/// Order in which records are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Sorted by timestamp, then paths, author and footerless message
    #[default]
    Canonical,
    /// Exactly as handed in
    AsGiven,
}

/// Writes records back out as a fast-import stream
#[derive(Debug, Clone)]
pub struct StreamWriter {
    pub target: String,
    /// 0 disables progress lines
    pub progress_divisions: usize,
    pub order: Order,
}

impl Default for StreamWriter {
    fn default() -> Self {
        StreamWriter {
            target: DEFAULT_TARGET.to_string(),
            progress_divisions: DEFAULT_PROGRESS_DIVISIONS,
            order: Order::default(),
        }
    }
}

impl StreamWriter {
    pub fn write<W: Write>(&self, records: &[CommitRecord], out: &mut W) -> io::Result<()> {
        let mut ordered: Vec<&CommitRecord> = records.iter().collect();
        if self.order == Order::Canonical {
            ordered.sort_by(|a, b| canonical_key(a).cmp(&canonical_key(b)));
        }

        writeln!(out, "reset {}", self.target)?;
        let total = ordered.len();
        let width = total.to_string().len();
        let interval = match self.progress_divisions {
            0 => None,
            divisions => Some((total / divisions).max(1)),
        };

        for (idx, record) in ordered.into_iter().enumerate() {
            let mark = idx + 1;
            if interval.is_some_and(|every| mark % every == 0) {
                let percent = 100.0 * mark as f64 / total as f64;
                writeln!(out, "progress {:02.0}%: {:>width$} of {} commits", percent, mark, total, width = width)?;
            }
            self.write_commit(record, mark, out)?;
        }
        out.flush()
    }

    fn write_commit<W: Write>(&self, record: &CommitRecord, mark: usize, out: &mut W) -> io::Result<()> {
        let ident = format!("{} {} +0000", record.author, record.timestamp);
        writeln!(out, "commit {}", self.target)?;
        writeln!(out, "mark :{}", mark)?;
        writeln!(out, "author {}", ident)?;
        writeln!(out, "committer {}", ident)?;
        write!(out, "data {}\n{}", record.message().len(), record.message())?;
        for op in record.files.values() {
            writeln!(out, "{}", op.raw)?;
        }
        writeln!(out)
    }
}

fn canonical_key(record: &CommitRecord) -> (i64, Vec<&String>, &str, &[String]) {
    (
        record.timestamp,
        record.files.keys().collect(),
        record.author.as_str(),
        record.footerless_message(),
    )
}
