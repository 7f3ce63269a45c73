// src/mangler.rs

//! Commit message normalization.
//!
//! Package-manager provenance lines that repoman/paludis appended to commit
//! messages, e.g.
//!
//! ```text
//! (Portage version: 2.1.6.13/cvs/Linux x86_64, RepoMan options: --force, signed Manifest commit with key 0x1234ABCD)
//! ```
//!
//! are turned into `Package-Manager:`, `RepoMan-Options:` and
//! `Manifest-Sign-Key:` trailers. Manifest recommit annotations are dropped.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Sign-key tokens that were never real keys. No trailer is emitted for them.
const KNOWN_BAD_SIGN_KEYS: &[&str] = &["key", "ultrabug"];

const HEX_DIGITS: &str = "abcdef0123456789";

fn paludis_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?mi)^\(paludis (0\.1.*)\)$").expect("valid regex"))
}

// The (tm)/(r) alternatives cover CPU strings such as
// "(Portage version: 2.2_pre7/cvs/Linux 2.6.25.4 Intel(R) Core(TM)2 Duo CPU E6750 @ 2.66GHz)".
fn portage_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^\(portage version: +(?:\((?:tm|r)\)|[^\)\n])+\)$").expect("valid regex")
    })
}

fn recommit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi) *\((?:manifest +recommit|(?:un)?signed +manifest +commit)\) *$").expect("valid regex")
    })
}

/// Rewrites a raw commit message. The result is trimmed and ends in exactly one newline.
pub fn mangle(message: &str) -> Result<String> {
    let message = paludis_re().replace_all(message, "Package-Manager: paludis-${1}/");
    // before the portage rule: a trailing annotation breaks its anchored match
    let message = recommit_re().replace_all(&message, "");
    let message = try_replace_all(portage_re(), &message, mangle_portage)?;
    Ok(format!("{}\n", message.trim()))
}

fn try_replace_all(re: &Regex, text: &str, mut replace: impl FnMut(&str) -> Result<String>) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        out.push_str(&replace(m.as_str())?);
        last = m.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn portage_error(reason: &str, content: &str) -> Error {
    Error::PortageLine { reason: reason.to_string(), content: content.to_string() }
}

/// Expands one `(portage version: ...)` line into trailer lines
fn mangle_portage(line: &str) -> Result<String> {
    let content = line
        .trim()
        .strip_prefix('(')
        .and_then(|c| c.strip_suffix(')'))
        .ok_or_else(|| portage_error("not parenthesized", line))?;

    let values: Vec<&str> = content.split(',').map(str::trim).collect();
    let version = values[0]
        .split_once(':')
        .map(|(_, v)| v.trim())
        .ok_or_else(|| portage_error("no version", content))?;
    let mut trailers = vec![format!("Package-Manager: portage-{}", version)];

    let values: Vec<&str> = values
        .into_iter()
        .filter(|v| !v.to_lowercase().contains("unsigned manifest"))
        .collect();

    let repoman: Vec<&str> = values
        .iter()
        .copied()
        .filter(|v| v.to_lowercase().contains("repoman options:"))
        .collect();
    if repoman.len() > 1 {
        return Err(portage_error("multiple repoman options", content));
    }
    if let Some(options) = repoman.first().and_then(|v| v.split_once(':')) {
        let options: Vec<&str> = options.1.split_whitespace().collect();
        trailers.push(format!("RepoMan-Options: {}", options.join(" ")));
    }

    let signage: Vec<String> = values
        .iter()
        .map(|v| v.to_lowercase())
        .filter(|v| v.contains("key") && v.contains("signed") && !v.contains("unsigned"))
        .collect();
    if signage.len() > 1 {
        return Err(portage_error("multiple signing statements", content));
    }
    if let Some(statement) = signage.first() {
        let token = match statement.rsplit_once(char::is_whitespace) {
            Some((_, token)) => token,
            None => return Err(portage_error("signing statement without key", content)),
        };
        if let Some(key) = sign_key(token, content)? {
            trailers.push(format!("Manifest-Sign-Key: 0x{}", key.to_uppercase()));
        }
    }

    Ok(trailers.join("\n"))
}

/// Validates a lowercased sign-key token. `None` means the key is dropped.
fn sign_key(token: &str, content: &str) -> Result<Option<String>> {
    let token = token.strip_prefix("0x").unwrap_or(token);
    if token.is_empty() || KNOWN_BAD_SIGN_KEYS.contains(&token) {
        return Ok(None);
    }
    let invalid = || Error::SignKey { token: token.to_string(), content: content.to_string() };
    if token.contains('@') {
        // lowercasing must not have changed the address
        if !content.contains(token) {
            return Err(invalid());
        }
        return Ok(Some(format!("<{}>", token)));
    }
    // a trailing "!" marks an unverified key; it stays in the trailer
    let digits = token.strip_suffix('!').unwrap_or(token);
    if !digits.chars().all(|c| HEX_DIGITS.contains(c)) {
        return Err(invalid());
    }
    Ok(Some(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portage_line_becomes_three_trailers() {
        let msg = "Version bump.\n\n(portage version: 2.2, repoman options: --force, signed Manifest commit with key 0xABCDEF)\n";
        assert_eq!(
            mangle(msg).unwrap(),
            "Version bump.\n\nPackage-Manager: portage-2.2\nRepoMan-Options: --force\nManifest-Sign-Key: 0xABCDEF\n"
        );
    }

    #[test]
    fn portage_match_is_case_insensitive_and_collapses_options() {
        let msg = "Fix.\n(Portage version: 2.1.6.13/cvs/Linux x86_64, RepoMan options:   --force  --ignore-arches)";
        assert_eq!(
            mangle(msg).unwrap(),
            "Fix.\nPackage-Manager: portage-2.1.6.13/cvs/Linux x86_64\nRepoMan-Options: --force --ignore-arches\n"
        );
    }

    #[test]
    fn cpu_trademark_strings_are_accepted() {
        let msg = "x\n(Portage version: 2.2_pre7/cvs/Linux 2.6.25.4 Intel(R) Core(TM)2 Duo CPU E6750 @ 2.66GHz)\n";
        assert_eq!(
            mangle(msg).unwrap(),
            "x\nPackage-Manager: portage-2.2_pre7/cvs/Linux 2.6.25.4 Intel(R) Core(TM)2 Duo CPU E6750 @ 2.66GHz\n"
        );
    }

    #[test]
    fn unsigned_manifest_component_is_ignored() {
        let msg = "x\n(Portage version: 2.2/cvs/Linux i686, unsigned Manifest commit)";
        assert_eq!(mangle(msg).unwrap(), "x\nPackage-Manager: portage-2.2/cvs/Linux i686\n");
    }

    #[test]
    fn unverified_key_keeps_marker() {
        let msg = "x\n(Portage version: 2.2, signed Manifest commit with key 1234abcd!)";
        assert_eq!(
            mangle(msg).unwrap(),
            "x\nPackage-Manager: portage-2.2\nManifest-Sign-Key: 0x1234ABCD!\n"
        );
    }

    #[test]
    fn known_bad_keys_are_dropped() {
        let msg = "x\n(Portage version: 2.2, signed Manifest commit with key ultrabug)";
        assert_eq!(mangle(msg).unwrap(), "x\nPackage-Manager: portage-2.2\n");
        let msg = "x\n(Portage version: 2.2, signed Manifest commit with key)";
        assert_eq!(mangle(msg).unwrap(), "x\nPackage-Manager: portage-2.2\n");
    }

    #[test]
    fn bare_hex_prefix_emits_no_key() {
        let msg = "x\n(Portage version: 2.2, signed Manifest commit with key 0x)";
        assert_eq!(mangle(msg).unwrap(), "x\nPackage-Manager: portage-2.2\n");
    }

    #[test]
    fn trailing_annotation_does_not_hide_portage_line() {
        let msg = "Bump.\n(Portage version: 2.2/cvs/Linux x86_64) (Signed Manifest commit)\n";
        assert_eq!(mangle(msg).unwrap(), "Bump.\nPackage-Manager: portage-2.2/cvs/Linux x86_64\n");
    }

    #[test]
    fn email_keys_are_bracketed() {
        let msg = "x\n(Portage version: 2.2, signed Manifest commit with key dev@gentoo.org)";
        assert_eq!(
            mangle(msg).unwrap(),
            "x\nPackage-Manager: portage-2.2\nManifest-Sign-Key: 0x<DEV@GENTOO.ORG>\n"
        );
    }

    #[test]
    fn email_key_with_changed_case_is_fatal() {
        let msg = "x\n(Portage version: 2.2, signed Manifest commit with key Dev@gentoo.org)";
        assert!(matches!(mangle(msg), Err(Error::SignKey { .. })));
    }

    #[test]
    fn non_hex_key_is_fatal() {
        let msg = "x\n(Portage version: 2.2, signed Manifest commit with key 0xNOTHEX)";
        let err = mangle(msg).unwrap_err();
        assert!(matches!(err, Error::SignKey { ref token, .. } if token == "nothex"));
    }

    #[test]
    fn repeated_repoman_options_are_fatal() {
        let msg = "(Portage version: 2.2, RepoMan options: --force, RepoMan options: --pretend)";
        assert!(matches!(mangle(msg), Err(Error::PortageLine { .. })));
    }

    #[test]
    fn paludis_signature_becomes_trailer() {
        let msg = "Bump\n(paludis 0.1.4)\n";
        assert_eq!(mangle(msg).unwrap(), "Bump\nPackage-Manager: paludis-0.1.4/\n");
    }

    #[test]
    fn recommit_annotations_are_stripped() {
        assert_eq!(mangle("Fix deps (manifest recommit)\n").unwrap(), "Fix deps\n");
        assert_eq!(mangle("Fix deps (Signed Manifest commit)  \n").unwrap(), "Fix deps\n");
        assert_eq!(mangle("Fix deps\n(unsigned  manifest commit)\n").unwrap(), "Fix deps\n");
    }

    #[test]
    fn output_is_trimmed_and_newline_terminated() {
        assert_eq!(mangle("\n\n  hello world  \n\n\n").unwrap(), "hello world\n");
    }

    #[test]
    fn mangling_is_idempotent() {
        let inputs = [
            "Version bump.\n\n(portage version: 2.2, repoman options: --force, signed Manifest commit with key 0xABCDEF)\n",
            "Bump\n(paludis 0.1.4)\n",
            "Fix deps (manifest recommit)\n",
            "Bump.\n(Portage version: 2.2/cvs/Linux x86_64) (Signed Manifest commit)\n",
            "plain message\n",
        ];
        for input in inputs {
            let once = mangle(input).unwrap();
            assert_eq!(mangle(&once).unwrap(), once);
        }
    }
}
