// src/cli.rs

use crate::dedup::DEFAULT_MANIFEST_WINDOW;
use crate::ingest::{IngestOptions, SourceLayout};
use crate::serializer::{Order, StreamWriter, DEFAULT_PROGRESS_DIVISIONS, DEFAULT_TARGET};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge the commit dumps of converted repositories into one stream on stdout
    Merge(MergeArgs),

    /// Print the author mapping built from a developer registry as JSON
    Mailmap {
        /// JSON array of {username, fullname, aliases}
        registry: PathBuf,
    },

    /// Point $Header$ keywords at the canonical CVS root, line by line
    RewriteHeaders {
        /// Directory the conversion ran in
        #[arg(long)]
        base: String,

        /// Input file; stdin when omitted
        input: Option<PathBuf>,
    },

    /// Rewrite keywords inside the data payloads of a blob stream
    RewriteBlobs {
        /// Scratch directory the keywords were expanded against
        #[arg(long)]
        output_dir: String,

        /// Input file; stdin when omitted
        input: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
pub struct MergeArgs {
    /// Converted repositories; read one per line from stdin when none are given
    pub dirs: Vec<PathBuf>,

    /// Ref the merged history is written to
    #[arg(long, default_value = DEFAULT_TARGET)]
    pub target: String,

    /// How far back a Manifest recommit may be folded, in seconds
    #[arg(long, default_value_t = DEFAULT_MANIFEST_WINDOW)]
    pub window: i64,

    /// Number of progress lines in the output stream (0 for none)
    #[arg(long, default_value_t = DEFAULT_PROGRESS_DIVISIONS)]
    pub progress: usize,

    /// Parallel parse workers (defaults to the number of CPUs)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Directory inside each repository holding the cvs2git output
    #[arg(long, default_value = "cvs2svn-tmp")]
    pub tmp_dir: String,

    /// Commit dump file name
    #[arg(long, default_value = "git-dump.dat")]
    pub dump_file: String,

    /// Blob index file name
    #[arg(long, default_value = "git-blob.idx")]
    pub blob_index: String,

    /// Sort by timestamp, paths, author and message instead of keeping merge order
    #[arg(long)]
    pub canonical_order: bool,

    /// Git repository holding the blobs; enables the thin Manifest rewrite
    #[arg(long)]
    pub thin_manifest_repo: Option<PathBuf>,

    /// Parallel workers for the thin Manifest rewrite
    #[arg(long)]
    pub thin_jobs: Option<usize>,
}

impl MergeArgs {
    pub fn layout(&self) -> SourceLayout {
        SourceLayout {
            tmp_dir: self.tmp_dir.clone(),
            dump_file: self.dump_file.clone(),
            blob_index: self.blob_index.clone(),
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions { jobs: self.jobs, window: self.window }
    }

    pub fn writer(&self) -> StreamWriter {
        StreamWriter {
            target: self.target.clone(),
            progress_divisions: self.progress,
            order: if self.canonical_order { Order::Canonical } else { Order::AsGiven },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_defaults() {
        let args = Args::parse_from(["dump-merge", "merge", "app-a", "app-b"]);
        let Command::Merge(merge) = args.command else {
            panic!("expected merge");
        };
        assert_eq!(merge.dirs, [PathBuf::from("app-a"), PathBuf::from("app-b")]);
        assert_eq!(merge.ingest_options().window, 300);
        let writer = merge.writer();
        assert_eq!(writer.target, "refs/heads/master");
        assert_eq!(writer.progress_divisions, 100);
        assert_eq!(writer.order, Order::AsGiven);
        assert_eq!(merge.layout().dump_file, "git-dump.dat");
    }

    #[test]
    fn merge_overrides() {
        let args = Args::parse_from([
            "dump-merge",
            "merge",
            "--target",
            "refs/heads/main",
            "--window",
            "60",
            "--progress",
            "0",
            "-j",
            "3",
            "--canonical-order",
        ]);
        let Command::Merge(merge) = args.command else {
            panic!("expected merge");
        };
        assert!(merge.dirs.is_empty());
        assert_eq!(merge.jobs, Some(3));
        assert_eq!(merge.ingest_options().window, 60);
        let writer = merge.writer();
        assert_eq!(writer.target, "refs/heads/main");
        assert_eq!(writer.progress_divisions, 0);
        assert_eq!(writer.order, Order::Canonical);
    }
}
