// src/blob_index.rs

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Resolves `:<mark>` blob references of one commit dump to object ids
#[derive(Debug, Default, Clone)]
pub struct BlobIndex {
    marks: HashMap<u64, String>,
}

impl BlobIndex {
    pub fn load(path: &Path) -> Result<BlobIndex> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        BlobIndex::from_reader(BufReader::new(file))
    }

    /// Parses `<mark> <object-id>` lines; the mark may carry a leading `:`.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<BlobIndex> {
        let mut marks = HashMap::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let (mark, id) = match (fields.next(), fields.next()) {
                (None, _) => continue,
                (Some(mark), Some(id)) => (mark, id),
                (Some(_), None) => {
                    return Err(Error::BlobIndex { line: i + 1, reason: "missing object id".into() })
                }
            };
            let mark = mark.trim_start_matches(':').parse::<u64>().map_err(|e| Error::BlobIndex {
                line: i + 1,
                reason: format!("bad mark {:?}: {}", mark, e),
            })?;
            marks.insert(mark, id.to_string());
        }
        Ok(BlobIndex { marks })
    }

    pub fn get(&self, mark: u64) -> Option<&str> {
        self.marks.get(&mark).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }
}

impl FromIterator<(u64, String)> for BlobIndex {
    fn from_iter<I: IntoIterator<Item = (u64, String)>>(iter: I) -> Self {
        BlobIndex { marks: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_marks_with_and_without_sigil() {
        let input = ":1 e8b9ed651c6209820779382edee2537209aba4ae\n\n2   0123456789abcdef0123456789abcdef01234567  \n";
        let index = BlobIndex::from_reader(input.as_bytes()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1), Some("e8b9ed651c6209820779382edee2537209aba4ae"));
        assert_eq!(index.get(2), Some("0123456789abcdef0123456789abcdef01234567"));
        assert_eq!(index.get(3), None);
    }

    #[test]
    fn later_entry_wins() {
        let index = BlobIndex::from_reader(":1 aaaa\n:1 bbbb\n".as_bytes()).unwrap();
        assert_eq!(index.get(1), Some("bbbb"));
    }

    #[test]
    fn rejects_malformed_lines() {
        let err = BlobIndex::from_reader(":1 aaaa\n:2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::BlobIndex { line: 2, .. }));
        let err = BlobIndex::from_reader(":x aaaa\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::BlobIndex { line: 1, .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BlobIndex::load(&dir.path().join("git-blob.idx")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
