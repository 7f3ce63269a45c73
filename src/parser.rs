// src/parser.rs

//! Reader for the commit dumps written by cvs2git.
//!
//! Only the subset of the fast-import grammar cvs2git emits is accepted:
//!
//! ```text
//! reset refs/heads/master          (optional, skipped)
//! progress ...                     (optional, skipped)
//! commit refs/heads/master
//! mark :12                         (ignored)
//! author robbat2 1199142367 +0000
//! committer robbat2 1199142367 +0000
//! data 22
//! <22 bytes of message>
//!                                  (optional)
//! M 100644 :34 dev-cpp/gtkmm/ChangeLog
//! D dev-cpp/gtkmm/files/old.patch
//!
//! ```
//!
//! Anything else is a fatal protocol error.

use crate::blob_index::BlobIndex;
use crate::error::{Error, Result};
use crate::mangler;
use crate::model::{normalize_path, CommitRecord, FileMap, FileOp};
use std::io::{BufRead, Read};

/// Lazily yields the commits of one dump in input order
pub struct CommitParser<'a, R> {
    reader: R,
    blobs: &'a BlobIndex,
    line_no: usize,
    done: bool,
}

impl<'a, R: BufRead> CommitParser<'a, R> {
    pub fn new(reader: R, blobs: &'a BlobIndex) -> Self {
        CommitParser { reader, blobs, line_no: 0, done: false }
    }

    /// Next raw line including its newline; empty at end of input
    fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        self.reader.read_until(b'\n', &mut buf)?;
        if !buf.is_empty() {
            self.line_no += 1;
        }
        String::from_utf8(buf).map_err(|_| Error::protocol(self.line_no, "invalid UTF-8"))
    }

    fn read_data(&mut self, size: usize) -> Result<String> {
        let mut buf = Vec::with_capacity(size);
        (&mut self.reader).take(size as u64).read_to_end(&mut buf)?;
        if buf.len() != size {
            return Err(Error::protocol(
                self.line_no,
                format!("expected {} bytes of commit message, got {}", size, buf.len()),
            ));
        }
        // keep line numbers of later errors meaningful
        self.line_no += buf.iter().filter(|&&b| b == b'\n').count();
        String::from_utf8(buf).map_err(|_| Error::protocol(self.line_no, "commit message is not UTF-8"))
    }

    fn parse_record(&mut self, mut line: String) -> Result<CommitRecord> {
        while matches!(first_word(&line), Some("reset") | Some("progress")) {
            line = self.read_line()?;
        }
        if first_word(&line) != Some("commit") {
            return Err(Error::protocol(self.line_no, format!("expected commit, got {:?}", line)));
        }

        // Header block up to and including the message.
        let mut author = None;
        let mut committer = None;
        let message = loop {
            line = self.read_line()?;
            let (command, value) = match line.trim_end_matches('\n').split_once(char::is_whitespace) {
                Some((command, value)) if !value.trim().is_empty() => (command, value.trim().to_string()),
                _ => return Err(Error::protocol(self.line_no, format!("bad header line {:?}", line))),
            };
            match command {
                "mark" | "from" => {}
                "author" => author = Some(value),
                "committer" => committer = Some(value),
                "data" => {
                    let size = value.parse::<usize>().map_err(|_| {
                        Error::protocol(self.line_no, format!("bad data length {:?}", value))
                    })?;
                    let raw = self.read_data(size)?;
                    break mangler::mangle(&raw)?;
                }
                _ => return Err(Error::protocol(self.line_no, format!("unexpected header {:?}", command))),
            }
        };

        // cvs2git's byte count does not always cover the newline after the message.
        line = self.read_line()?;
        if line == "\n" {
            line = self.read_line()?;
        }
        if first_word(&line) == Some("from") {
            line = self.read_line()?;
        }

        let mut files = FileMap::new();
        while line != "\n" {
            let op = line
                .strip_suffix('\n')
                .ok_or_else(|| Error::protocol(self.line_no, "unterminated file operation block"))?;
            let (path, op) = self.parse_file_op(op)?;
            files.insert(path, op);
            line = self.read_line()?;
        }

        let author = match (author, committer) {
            (Some(author), Some(committer)) if author == committer => author,
            (None, Some(committer)) => committer,
            (author, committer) => {
                return Err(Error::protocol(
                    self.line_no,
                    format!("author {:?} does not match committer {:?}", author, committer),
                ))
            }
        };
        let (name, timestamp) = split_author(&author).ok_or_else(|| {
            Error::protocol(self.line_no, format!("author {:?} is not '<name> <timestamp> +0000'", author))
        })?;

        Ok(CommitRecord::new(name, timestamp, message, files))
    }

    fn parse_file_op(&self, line: &str) -> Result<(String, FileOp)> {
        let normalize = |path: &str| {
            normalize_path(path).ok_or_else(|| Error::protocol(self.line_no, format!("bad path {:?}", path)))
        };
        match line.split_once(char::is_whitespace) {
            Some(("D", path)) => Ok((normalize(path.trim())?, FileOp::delete(line))),
            Some(("M", rest)) => {
                let mut fields = rest.trim_start().splitn(3, ' ');
                let (mode, object, path) = match (fields.next(), fields.next(), fields.next()) {
                    (Some(mode), Some(object), Some(path)) if !path.trim().is_empty() => (mode, object, path),
                    _ => return Err(Error::protocol(self.line_no, format!("bad modify line {:?}", line))),
                };
                let path = normalize(path.trim())?;
                let op = match object.strip_prefix(':') {
                    Some(mark) => {
                        let mark = mark.parse::<u64>().map_err(|_| {
                            Error::protocol(self.line_no, format!("bad mark reference {:?}", object))
                        })?;
                        let id = self
                            .blobs
                            .get(mark)
                            .ok_or(Error::UnknownMark { line: self.line_no, mark })?;
                        FileOp::modify(format!("M {} {} {}", mode, id, path))
                    }
                    None => FileOp::modify(line),
                };
                Ok((path, op))
            }
            _ => Err(Error::protocol(self.line_no, format!("unknown file operation {:?}", line))),
        }
    }
}

impl<R: BufRead> Iterator for CommitParser<'_, R> {
    type Item = Result<CommitRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.read_line().and_then(|line| {
            if line.is_empty() {
                return Ok(None);
            }
            self.parse_record(line).map(Some)
        });
        match result {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn first_word(line: &str) -> Option<&str> {
    line.split_whitespace().next()
}

/// Splits `<name> <timestamp> +0000` into name and timestamp
fn split_author(author: &str) -> Option<(String, i64)> {
    let (rest, offset) = author.rsplit_once(char::is_whitespace)?;
    if offset != "+0000" {
        return None;
    }
    let (name, timestamp) = rest.trim_end().rsplit_once(char::is_whitespace)?;
    let name = name.trim_end();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), timestamp.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str, blobs: &BlobIndex) -> Result<Vec<CommitRecord>> {
        CommitParser::new(input.as_bytes(), blobs).collect()
    }

    const DUMP: &str = "reset refs/heads/master\n\
commit refs/heads/master\n\
mark :1\n\
author robbat2 1199142367 +0000\n\
committer robbat2 1199142367 +0000\n\
data 20\n\
Initial import.    \n\
\n\
M 100644 :7 dev-cpp/gtkmm//ChangeLog\n\
M 100644 e8b9ed651c6209820779382edee2537209aba4ae dev-cpp/gtkmm/Manifest\n\
D dev-cpp/gtkmm/files/./old.patch\n\
\n\
progress 50%\n\
commit refs/heads/master\n\
author Some Body 1199142400 +0000\n\
committer Some Body 1199142400 +0000\n\
data 4\n\
two\n\
D a/b\n\
\n";

    fn blobs() -> BlobIndex {
        [(7, "0123456789abcdef0123456789abcdef01234567".to_string())].into_iter().collect()
    }

    #[test]
    fn parses_records_in_order() {
        let records = parse(DUMP, &blobs()).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.author, "robbat2");
        assert_eq!(first.timestamp, 1199142367);
        assert_eq!(first.message(), "Initial import.\n");
        assert_eq!(
            first.files.keys().collect::<Vec<_>>(),
            ["dev-cpp/gtkmm/ChangeLog", "dev-cpp/gtkmm/Manifest", "dev-cpp/gtkmm/files/old.patch"]
        );
        assert_eq!(
            first.files["dev-cpp/gtkmm/ChangeLog"].raw,
            "M 100644 0123456789abcdef0123456789abcdef01234567 dev-cpp/gtkmm/ChangeLog"
        );
        assert_eq!(
            first.files["dev-cpp/gtkmm/Manifest"].raw,
            "M 100644 e8b9ed651c6209820779382edee2537209aba4ae dev-cpp/gtkmm/Manifest"
        );
        assert_eq!(first.files["dev-cpp/gtkmm/files/old.patch"].raw, "D dev-cpp/gtkmm/files/./old.patch");

        let second = &records[1];
        assert_eq!(second.author, "Some Body");
        assert_eq!(second.message(), "two\n");
        assert_eq!(second.files.len(), 1);
    }

    #[test]
    fn messages_are_mangled_while_parsing() {
        let msg = "Bump.\n(Portage version: 2.2, RepoMan options: --force)\n";
        let input = format!(
            "commit refs/heads/master\nauthor a 5 +0000\ncommitter a 5 +0000\ndata {}\n{}D x/y\n\n",
            msg.len(),
            msg
        );
        let records = parse(&input, &BlobIndex::default()).unwrap();
        assert_eq!(
            records[0].message(),
            "Bump.\nPackage-Manager: portage-2.2\nRepoMan-Options: --force\n"
        );
        assert_eq!(records[0].footerless_message(), ["Bump.".to_string()]);
    }

    #[test]
    fn later_duplicate_path_wins() {
        let input = "commit r\ncommitter a 5 +0000\ndata 2\nm\nM 100644 aaaa x/y\nD x/y\n\n";
        let records = parse(input, &BlobIndex::default()).unwrap();
        assert_eq!(records[0].files["x/y"].raw, "D x/y");
        assert_eq!(records[0].author, "a");
    }

    #[test]
    fn author_committer_mismatch_is_fatal() {
        let input = "commit r\nauthor a 5 +0000\ncommitter b 5 +0000\ndata 2\nm\nD x\n\n";
        assert!(matches!(parse(input, &BlobIndex::default()), Err(Error::Protocol { .. })));
    }

    #[test]
    fn non_utc_offset_is_fatal() {
        let input = "commit r\nauthor a 5 +0100\ncommitter a 5 +0100\ndata 2\nm\nD x\n\n";
        assert!(matches!(parse(input, &BlobIndex::default()), Err(Error::Protocol { .. })));
    }

    #[test]
    fn short_message_is_fatal() {
        let input = "commit r\nauthor a 5 +0000\ncommitter a 5 +0000\ndata 200\nm\nD x\n\n";
        let err = parse(input, &BlobIndex::default()).unwrap_err();
        assert!(matches!(err, Error::Protocol { line: 4, .. }));
    }

    #[test]
    fn unknown_operation_is_fatal() {
        let input = "commit r\nauthor a 5 +0000\ncommitter a 5 +0000\ndata 2\nm\nR x y\n\n";
        let err = parse(input, &BlobIndex::default()).unwrap_err();
        assert!(matches!(err, Error::Protocol { line: 6, .. }));
    }

    #[test]
    fn unknown_header_is_fatal() {
        let input = "commit r\nencoding utf-8\nauthor a 5 +0000\n";
        assert!(matches!(parse(input, &BlobIndex::default()), Err(Error::Protocol { line: 2, .. })));
    }

    #[test]
    fn unknown_mark_is_fatal() {
        let input = "commit r\nauthor a 5 +0000\ncommitter a 5 +0000\ndata 2\nm\nM 100644 :9 x/y\n\n";
        assert!(matches!(
            parse(input, &BlobIndex::default()),
            Err(Error::UnknownMark { mark: 9, .. })
        ));
    }

    #[test]
    fn escaping_path_is_fatal() {
        let input = "commit r\nauthor a 5 +0000\ncommitter a 5 +0000\ndata 2\nm\nD ../x\n\n";
        assert!(matches!(parse(input, &BlobIndex::default()), Err(Error::Protocol { .. })));
    }

    #[test]
    fn truncated_stream_is_fatal() {
        let input = "commit r\nauthor a 5 +0000\ncommitter a 5 +0000\ndata 2\nm\nD x";
        assert!(parse(input, &BlobIndex::default()).is_err());
    }

    #[test]
    fn iteration_stops_after_error() {
        let input = "bogus\ncommit r\n";
        let blobs = BlobIndex::default();
        let mut parser = CommitParser::new(input.as_bytes(), &blobs);
        assert!(parser.next().unwrap().is_err());
        assert!(parser.next().is_none());
    }

    #[test]
    fn splits_author_field() {
        assert_eq!(split_author("Jane Q. Dev 1199142367 +0000"), Some(("Jane Q. Dev".to_string(), 1199142367)));
        assert_eq!(split_author("1199142367 +0000"), None);
        assert_eq!(split_author("jane abc +0000"), None);
        assert_eq!(split_author("jane 1199142367 -0500"), None);
    }
}
