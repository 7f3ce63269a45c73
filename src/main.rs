// src/main.rs

mod blob_index;
mod cli;
mod dedup;
mod error;
mod ingest;
mod keywords;
mod mailmap;
mod mangler;
mod model;
mod parser;
mod serializer;
mod thin_manifest;

use anyhow::Context;
use chrono::TimeZone;
use clap::Parser;
use cli::{Args, Command, MergeArgs};
use keywords::{BlobKeywordRewriter, HeaderRewriter};
use model::CommitRecord;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use thin_manifest::GitObjectStore;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    // stdout carries the commit stream, so all diagnostics go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let result = match args.command {
        Command::Merge(merge) => run_merge(&merge),
        Command::Mailmap { registry } => run_mailmap(&registry),
        Command::RewriteHeaders { base, input } => run_rewrite(input.as_deref(), |reader, out| {
            HeaderRewriter::new(&base)?.rewrite(reader, out)?;
            Ok(())
        }),
        Command::RewriteBlobs { output_dir, input } => run_rewrite(input.as_deref(), |reader, out| {
            BlobKeywordRewriter::new(&output_dir)?.rewrite_stream(reader, out)?;
            Ok(())
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_merge(args: &MergeArgs) -> anyhow::Result<()> {
    let start_time = Instant::now();

    let dirs = ingest::source_dirs(&args.dirs).context("reading source directories")?;
    let sources = ingest::locate_sources(&dirs, &args.layout());
    info!("Merging {} of {} source directories", sources.len(), dirs.len());

    let mut records = ingest::ingest(&sources, &args.ingest_options())?;
    info!("Ingest finished in {:.2?}. {} commits remain.", start_time.elapsed(), records.len());
    log_span(&records);

    if let Some(repo) = &args.thin_manifest_repo {
        let store = GitObjectStore::open(repo).with_context(|| format!("opening {}", repo.display()))?;
        records = thin_manifest::rewrite_manifests(records, &store, args.thin_jobs)?;
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    args.writer().write(&records, &mut out).context("writing commit stream")?;

    info!("Total time: {:.2?}", start_time.elapsed());
    Ok(())
}

fn log_span(records: &[CommitRecord]) {
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return;
    };
    let date = |ts: i64| {
        chrono::Utc
            .timestamp_opt(ts, 0)
            .single()
            .map_or_else(|| ts.to_string(), |t| t.to_rfc2822())
    };
    info!("History spans from {} to {}.", date(first.timestamp), date(last.timestamp));
}

fn run_mailmap(registry: &Path) -> anyhow::Result<()> {
    let users = mailmap::load_registry(registry)?;
    let mailmap = mailmap::build_mailmap(&users);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &mailmap)?;
    writeln!(out)?;
    Ok(())
}

fn run_rewrite<F>(input: Option<&Path>, rewrite: F) -> anyhow::Result<()>
where
    F: FnOnce(Box<dyn BufRead>, &mut dyn Write) -> error::Result<()>,
{
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    rewrite(reader, &mut out)?;
    Ok(())
}
