//! Signature extraction from raw wikitext.
//!
//! A signature is one "author + timestamp" occurrence. The scanner finds
//! every timestamp, walks backward a bounded distance for the author link,
//! falls back to unsigned-template detection, and computes the indentation
//! prefix of the enclosing logical line. Malformed pairings are dropped
//! silently: wikitext is free-form, and a false negative is always preferable
//! to a crash.

use chrono::{DateTime, Utc};
use regex::Regex;
use tf_config::SiteConfig;

use crate::error::SetupError;
use crate::mask::Masker;
use crate::timestamp::TimestampParser;

/// Characters that form an indentation prefix.
pub(crate) const INDENTATION_CHARS: [char; 4] = [':', '*', '#', ';'];

/// An earlier signature on the same logical line as a [`Signature`].
///
/// A line with several timestamps is still one comment; only the last
/// signature ends it, and the earlier ones are kept here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraSignature {
    /// Author user name.
    pub author: String,
    /// Rendered timestamp.
    pub timestamp: String,
    /// Byte offset of the signature start in the scanned code.
    pub start_index: usize,
    /// Byte offset just past the timestamp.
    pub end_index: usize,
}

/// One textual "author + timestamp" match in wikitext.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Author user name, normalized (underscores to spaces).
    pub author: String,
    /// Timestamp in its original rendered form.
    pub timestamp: String,
    /// Parsed timestamp instant, when the rendered form is a valid date.
    pub date: Option<DateTime<Utc>>,
    /// Indentation prefix (`:`/`*`/`#`/`;`) of the enclosing logical line.
    pub indentation_chars: String,
    /// Byte offset of the logical line start in the scanned code.
    pub line_start_index: usize,
    /// Byte offset of the signature start (including any decorative prefix).
    pub start_index: usize,
    /// Byte offset just past the timestamp.
    pub end_index: usize,
    /// Raw matched text, byte-identical to the input slice.
    pub dirty_code: String,
    /// Whether the signature was recovered from an unsigned template.
    pub is_unsigned: bool,
    /// Earlier signatures sharing this signature's line.
    pub extras: Vec<ExtraSignature>,
}

/// Scans wikitext for signatures.
///
/// Built once per site configuration; `find_signatures` is pure, so one
/// scanner can serve any number of code strings.
#[derive(Debug)]
pub struct SignatureScanner<'c> {
    config: &'c SiteConfig,
    parser: TimestampParser,
    masker: Masker,
    author_link_re: Regex,
    prefix_re: Regex,
    unsigned_re: Regex,
}

impl<'c> SignatureScanner<'c> {
    /// Build a scanner from site configuration.
    pub fn new(config: &'c SiteConfig) -> Result<Self, SetupError> {
        let parser = TimestampParser::new(config)?;
        let masker = Masker::new(&config.hidden_tags)?;

        let namespaces: Vec<String> = config
            .signatures
            .user_namespaces
            .iter()
            .map(|n| regex::escape(n).replace(r"\ ", "[ _]+"))
            .collect();
        let contributions =
            regex::escape(&config.signatures.contributions_page).replace(r"\ ", "[ _]+");
        let author_link_re = Regex::new(&format!(
            r"(?i)\[\[\s*:?\s*(?:(?:{})\s*:\s*([^\[\]|#/]+)|{}/\s*([^\[\]|#]+?)\s*)(?:[|#][^\[\]]*)?\]\]",
            namespaces.join("|"),
            contributions,
        ))?;

        let prefix_re = Regex::new(&config.signatures.prefix_pattern)?;

        let unsigned_names: Vec<String> = config
            .templates
            .unsigned
            .iter()
            .map(|n| regex::escape(n))
            .collect();
        let unsigned_re = Regex::new(&format!(
            r"(?i)\{{\{{\s*(?:{})\s*\|\s*([^|}}]+?)\s*(?:\|([^}}]*))?\}}\}}",
            unsigned_names.join("|"),
        ))?;

        Ok(Self {
            config,
            parser,
            masker,
            author_link_re,
            prefix_re,
            unsigned_re,
        })
    }

    /// Find every signature in `code`, in document order.
    ///
    /// Byte offsets on the returned signatures index into `code` itself: the
    /// scan runs on a same-length masked copy so that comments and embedded
    /// template newlines cannot produce false lines or false timestamps.
    #[must_use]
    pub fn find_signatures(&self, code: &str) -> Vec<Signature> {
        let masked = self.masker.mask_distracting_code(code);
        let mut signatures: Vec<Signature> = Vec::new();

        for caps in self.parser.regex().captures_iter(&masked) {
            let ts = caps.get(0).expect("group 0 always present");
            let line_start = masked[..ts.start()].rfind('\n').map_or(0, |p| p + 1);

            let Some(found) = self.resolve_author(&masked, line_start, ts.start(), ts.end())
            else {
                tracing::trace!(offset = ts.start(), "timestamp without author dropped");
                continue;
            };

            let indentation_chars: String = masked[line_start..]
                .chars()
                .take_while(|c| INDENTATION_CHARS.contains(c))
                .collect();

            // A later signature on the same logical line supersedes the
            // earlier one and keeps it as an extra.
            let mut extras = Vec::new();
            if signatures
                .last()
                .is_some_and(|s| s.line_start_index == line_start)
            {
                let prev = signatures.pop().expect("checked non-empty");
                extras = prev.extras;
                extras.push(ExtraSignature {
                    author: prev.author,
                    timestamp: prev.timestamp,
                    start_index: prev.start_index,
                    end_index: prev.end_index,
                });
            }

            signatures.push(Signature {
                author: found.author,
                timestamp: code[ts.start()..ts.end()].to_owned(),
                date: self.parser.parse_captures(&caps),
                indentation_chars,
                line_start_index: line_start,
                start_index: found.start_index,
                end_index: found.end_index,
                dirty_code: code[found.start_index..found.end_index].to_owned(),
                is_unsigned: found.is_unsigned,
                extras,
            });
        }

        signatures
    }

    /// Find the author for a timestamp: the last user link within the scan
    /// limit before it, else an unsigned template enclosing it.
    fn resolve_author(
        &self,
        masked: &str,
        line_start: usize,
        ts_start: usize,
        ts_end: usize,
    ) -> Option<FoundAuthor> {
        let scan_floor = floor_char_boundary(
            masked,
            ts_start.saturating_sub(self.config.signatures.scan_limit),
        )
        .max(line_start);

        if let Some(link) = self
            .author_link_re
            .captures_iter(&masked[scan_floor..ts_start])
            .last()
        {
            let name = link
                .get(1)
                .or_else(|| link.get(2))
                .expect("author alternation always captures")
                .as_str();
            let link_start = scan_floor + link.get(0).expect("group 0").start();
            let start_index = self
                .prefix_re
                .find(&masked[line_start..link_start])
                .map_or(link_start, |p| line_start + p.start());
            return Some(FoundAuthor {
                author: normalize_author(name),
                start_index,
                end_index: ts_end,
                is_unsigned: false,
            });
        }

        let line_end = masked[ts_end..]
            .find('\n')
            .map_or(masked.len(), |p| ts_end + p);
        let unsigned = self.unsigned_re.captures(&masked[line_start..line_end])?;
        let span = unsigned.get(0).expect("group 0");
        let (start, end) = (line_start + span.start(), line_start + span.end());
        // The timestamp must belong to the template, not merely share a line.
        if !(start <= ts_start && ts_end <= end) {
            return None;
        }
        Some(FoundAuthor {
            author: normalize_author(&unsigned[1]),
            start_index: start,
            end_index: end,
            is_unsigned: true,
        })
    }
}

struct FoundAuthor {
    author: String,
    start_index: usize,
    end_index: usize,
    is_unsigned: bool,
}

fn normalize_author(name: &str) -> String {
    name.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TS1: &str = "12:30, 25 January 2024 (UTC)";
    const TS2: &str = "13:45, 25 January 2024 (UTC)";

    fn config() -> SiteConfig {
        SiteConfig::default()
    }

    fn scanner(config: &SiteConfig) -> SignatureScanner<'_> {
        SignatureScanner::new(config).unwrap()
    }

    #[test]
    fn test_simple_signature() {
        let config = config();
        let code = format!(": Some reply. [[User:Alice|Alice]] ([[User talk:Alice|talk]]) {TS1}\n");
        let sigs = scanner(&config).find_signatures(&code);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].author, "Alice");
        assert_eq!(sigs[0].timestamp, TS1);
        assert_eq!(sigs[0].indentation_chars, ":");
        assert!(sigs[0].date.is_some());
        assert!(!sigs[0].is_unsigned);
        assert_eq!(sigs[0].line_start_index, 0);
        assert_eq!(&code[sigs[0].start_index..sigs[0].end_index], sigs[0].dirty_code);
        assert!(sigs[0].dirty_code.ends_with(TS1));
    }

    #[test]
    fn test_document_order_and_indentation() {
        let config = config();
        let code = format!(
            "== Topic ==\nFirst. [[User:Alice|A]] {TS1}\n::* Nested. [[User:Bob|B]] {TS2}\n"
        );
        let sigs = scanner(&config).find_signatures(&code);
        assert_eq!(sigs.len(), 2);
        assert_eq!(sigs[0].author, "Alice");
        assert_eq!(sigs[1].author, "Bob");
        assert_eq!(sigs[1].indentation_chars, "::*");
        assert!(sigs[0].start_index < sigs[1].start_index);
    }

    #[test]
    fn test_timestamp_without_author_dropped() {
        let config = config();
        let code = format!("Stray timestamp {TS1} with no link\n");
        assert!(scanner(&config).find_signatures(&code).is_empty());
    }

    #[test]
    fn test_unsigned_template() {
        let config = config();
        let code = format!("Forgot to sign. {{{{unsigned|Bob|{TS1}}}}}\n");
        let sigs = scanner(&config).find_signatures(&code);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].author, "Bob");
        assert!(sigs[0].is_unsigned);
        assert!(sigs[0].dirty_code.starts_with("{{unsigned"));
    }

    #[test]
    fn test_signature_inside_comment_ignored() {
        let config = config();
        let code = format!("<!-- [[User:Alice|A]] {TS1} -->\nReal. [[User:Bob|B]] {TS2}\n");
        let sigs = scanner(&config).find_signatures(&code);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].author, "Bob");
    }

    #[test]
    fn test_two_signatures_on_one_line_keeps_last() {
        let config = config();
        let code = format!(": Moved. [[User:Alice|A]] {TS1} struck by [[User:Bob|B]] {TS2}\n");
        let sigs = scanner(&config).find_signatures(&code);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].author, "Bob");
        assert_eq!(sigs[0].timestamp, TS2);
        assert_eq!(sigs[0].extras.len(), 1);
        assert_eq!(sigs[0].extras[0].author, "Alice");
        assert_eq!(sigs[0].extras[0].timestamp, TS1);
    }

    #[test]
    fn test_template_newline_does_not_split_line() {
        let config = config();
        let code = format!(":: Quote {{{{quote|first\nsecond}}}} end. [[User:Alice|A]] {TS1}\n");
        let sigs = scanner(&config).find_signatures(&code);
        assert_eq!(sigs.len(), 1);
        // The logical line starts at the real line start, not inside the
        // template.
        assert_eq!(sigs[0].line_start_index, 0);
        assert_eq!(sigs[0].indentation_chars, "::");
    }

    #[test]
    fn test_contributions_link_for_ip_author() {
        let config = config();
        let code = format!("Anon note. [[Special:Contributions/203.0.113.7|203.0.113.7]] {TS1}\n");
        let sigs = scanner(&config).find_signatures(&code);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].author, "203.0.113.7");
        assert!(!sigs[0].is_unsigned);
    }

    #[test]
    fn test_underscored_author_normalized() {
        let config = config();
        let code = format!("Hi. [[User:Jane_Q_Public|Jane]] {TS1}\n");
        let sigs = scanner(&config).find_signatures(&code);
        assert_eq!(sigs[0].author, "Jane Q Public");
    }

    #[test]
    fn test_author_beyond_scan_limit_dropped() {
        let mut config = config();
        config.signatures.scan_limit = 20;
        let filler = "x".repeat(60);
        let code = format!("[[User:Alice|A]] {filler} {TS1}\n");
        assert!(scanner(&config).find_signatures(&code).is_empty());
    }
}
