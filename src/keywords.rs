// src/keywords.rs

//! CVS keyword cleanup.
//!
//! cvs2git expanded `$Header$` and `$Source$` against the scratch directory
//! the conversion ran in. These rewrites point them back at the canonical
//! `/var/cvsroot` location.

use crate::error::{Error, Result};
use regex::bytes::{NoExpand, Regex};
use std::borrow::Cow;
use std::io::{BufRead, Read, Write};

pub const CANONICAL_ROOT: &str = "/var/cvsroot";

/// Line rewrite of `$Header: <base>/output/<category>/cvs-repo/...`
pub struct HeaderRewriter {
    pattern: Regex,
    replacement: Vec<u8>,
}

impl HeaderRewriter {
    pub fn new(base: &str) -> Result<HeaderRewriter> {
        let base = base.trim_end_matches('/');
        let pattern = Regex::new(&format!(r"\$Header: {}/output/.*/cvs-repo/", regex::escape(base)))?;
        Ok(HeaderRewriter { pattern, replacement: format!("$Header: {}/", CANONICAL_ROOT).into_bytes() })
    }

    pub fn rewrite_line<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]> {
        self.pattern.replace_all(line, NoExpand(&self.replacement))
    }

    pub fn rewrite<R: BufRead, W: Write + ?Sized>(&self, mut input: R, output: &mut W) -> Result<()> {
        let mut line = Vec::new();
        loop {
            line.clear();
            if input.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            output.write_all(&self.rewrite_line(&line))?;
        }
        output.flush()?;
        Ok(())
    }
}

/// Keyword rewrite applied to the `data` payloads of a blob stream
pub struct BlobKeywordRewriter {
    substitutions: Vec<(Regex, Vec<u8>)>,
}

impl BlobKeywordRewriter {
    pub fn new(output_dir: &str) -> Result<BlobKeywordRewriter> {
        let pairs = [
            (format!("$Header: {}", output_dir), format!("$Header: {}", CANONICAL_ROOT)),
            (format!("$Source: {}", output_dir), format!("$Source: {}", CANONICAL_ROOT)),
            ("$Name: not supported by cvs2svn $".to_string(), "$Name:  $".to_string()),
        ];
        let substitutions = pairs
            .into_iter()
            .map(|(from, to)| -> Result<(Regex, Vec<u8>)> {
                Ok((Regex::new(&regex::escape(&from))?, to.into_bytes()))
            })
            .collect::<Result<_>>()?;
        Ok(BlobKeywordRewriter { substitutions })
    }

    pub fn rewrite_payload(&self, data: &[u8]) -> Vec<u8> {
        let mut data = data.to_vec();
        for (pattern, replacement) in &self.substitutions {
            let rewritten = match pattern.replace_all(&data, NoExpand(replacement)) {
                Cow::Owned(rewritten) => Some(rewritten),
                Cow::Borrowed(_) => None,
            };
            if let Some(rewritten) = rewritten {
                data = rewritten;
            }
        }
        data
    }

    /// Copies a blob stream, rewriting each payload and its `data` length
    pub fn rewrite_stream<R: BufRead, W: Write + ?Sized>(&self, mut input: R, output: &mut W) -> Result<()> {
        let mut line = Vec::new();
        let mut line_no = 0;
        loop {
            line.clear();
            if input.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            line_no += 1;
            let Some(size) = data_length(&line) else {
                output.write_all(&line)?;
                continue;
            };
            let size = size.ok_or_else(|| Error::protocol(line_no, "bad data length"))?;

            let mut payload = Vec::with_capacity(size);
            (&mut input).take(size as u64).read_to_end(&mut payload)?;
            if payload.len() != size {
                return Err(Error::protocol(
                    line_no,
                    format!("expected {} bytes of data, got {}", size, payload.len()),
                ));
            }
            line_no += payload.iter().filter(|&&b| b == b'\n').count();

            let payload = self.rewrite_payload(&payload);
            writeln!(output, "data {}", payload.len())?;
            output.write_all(&payload)?;
        }
        output.flush()?;
        Ok(())
    }
}

/// `Some(length)` for a `data` command line, `None` for any other line
fn data_length(line: &[u8]) -> Option<Option<usize>> {
    let rest = line.strip_prefix(b"data")?;
    if !rest.first().is_some_and(u8::is_ascii_whitespace) {
        return None;
    }
    Some(std::str::from_utf8(rest).ok().and_then(|n| n.trim().parse().ok()))
}
