//! Comment source location: binding a rendered comment to its wikitext.
//!
//! Given a DOM-derived [`CommentDescriptor`] and a page's (or section's) raw
//! wikitext, the locator scores every signature that plausibly matches the
//! comment and accepts the best candidate only when it clears a fixed
//! threshold. The scoring weights encode accumulated product behavior, so
//! they live here as named constants with tests pinning their values.

use regex::Regex;
use std::sync::OnceLock;
use tf_config::{IndentationMode, SiteConfig};
use tf_model::CommentDescriptor;

use crate::error::{Error, SetupError, SourceError};
use crate::signature::{Signature, SignatureScanner};
use crate::similarity::{remove_wiki_markup, word_overlap};

/// A candidate is accepted only with a score strictly above this.
pub const MATCH_SCORE_THRESHOLD: f64 = 2.5;

/// Weight of the word-overlap ratio between the comment's rendered text and
/// the candidate's de-markup'd body.
const OVERLAP_WEIGHT: f64 = 1.0;

/// Maximum contribution of ordinal proximity; decays as `w / (1 + delta)`.
const ORDINAL_WEIGHT: f64 = 0.5;

/// Contribution of section-headline agreement.
const HEADLINE_WEIGHT: f64 = 1.0;

/// Contribution of the previous-comments continuity check.
const CONTINUITY_WEIGHT: f64 = 1.0;

fn headline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(={1,6})[ \t]*(.*?)[ \t]*=+[ \t]*$").unwrap())
}

/// A scored hypothesis binding a rendered comment to one signature location.
///
/// Not persisted: sources must be recomputed whenever the underlying page
/// code is refreshed.
#[derive(Debug, Clone)]
pub struct CommentSource {
    /// The matched signature.
    pub signature: Signature,
    /// The comment's body code (from the line after the previous signature
    /// up to this signature).
    pub code: String,
    /// Byte offset of the comment's first logical line in the searched code.
    pub line_start_index: usize,
    /// Byte offset just past the signature's timestamp.
    pub signature_end_index: usize,
    /// Indentation prefix of the comment's final line.
    pub indentation: String,
    /// Indentation a new reply under this comment should use.
    pub reply_indentation: String,
    /// Heading level when the comment opens its section.
    pub heading_level: Option<u8>,
    /// Whether content following the comment already carries an outdent
    /// template a reply must account for.
    pub is_reply_outdented: bool,
    /// Outdent level delta for the reply, when `is_reply_outdented`.
    pub outdent_level: Option<u32>,
    /// Composite match score; only candidates above
    /// [`MATCH_SCORE_THRESHOLD`] are ever returned.
    pub score: f64,
}

/// Locates comment sources in wikitext.
///
/// Pure with respect to its inputs: the same `(comment, code)` pair always
/// produces the same result, with no caching across calls.
#[derive(Debug)]
pub struct Locator<'c> {
    config: &'c SiteConfig,
    scanner: SignatureScanner<'c>,
    outdent_re: Option<Regex>,
}

impl<'c> Locator<'c> {
    /// Build a locator from site configuration.
    pub fn new(config: &'c SiteConfig) -> Result<Self, SetupError> {
        let scanner = SignatureScanner::new(config)?;
        let outdent_re = if config.templates.outdent.is_empty() {
            None
        } else {
            let names: Vec<String> = config
                .templates
                .outdent
                .iter()
                .map(|n| regex::escape(n))
                .collect();
            Some(Regex::new(&format!(
                r"^[:*#;]*[ \t]*\{{\{{\s*(?:{})\s*(?:\|\s*([^|}}]*))?[^}}]*\}}\}}",
                names.join("|"),
            ))?)
        };
        Ok(Self {
            config,
            scanner,
            outdent_re,
        })
    }

    /// Locate `comment` in `code`.
    ///
    /// `in_section` indicates the code covers only the comment's section, in
    /// which case headline agreement is not used as evidence (the caller
    /// already scoped the search). Fails with `noCode` when `code` is absent
    /// and `locateComment` when no candidate clears the threshold.
    pub fn locate(
        &self,
        comment: &CommentDescriptor,
        code: Option<&str>,
        in_section: bool,
    ) -> Result<CommentSource, Error> {
        let code = code.ok_or(SourceError::NoCode)?;
        let signatures = self.scanner.find_signatures(code);

        let mut candidates: Vec<CommentSource> = Vec::new();
        for (index, signature) in signatures.iter().enumerate() {
            if !author_matches(comment, signature) || !timestamp_matches(comment, signature) {
                continue;
            }
            let body = comment_body(code, &signatures, index);
            let score = self.score(comment, code, &signatures, index, body, in_section);
            tracing::debug!(
                score,
                offset = signature.start_index,
                author = %signature.author,
                "scored source candidate"
            );
            candidates.push(self.build_source(comment, code, signature, body, score));
        }

        // Deterministic tiebreak: equal scores resolve to the smallest
        // offset (document order).
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.signature.start_index.cmp(&b.signature.start_index))
        });

        tracing::debug!(count = candidates.len(), "located source candidates");
        candidates
            .into_iter()
            .next()
            .filter(|c| c.score > MATCH_SCORE_THRESHOLD)
            .ok_or_else(|| SourceError::LocateComment.into())
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(
        &self,
        comment: &CommentDescriptor,
        code: &str,
        signatures: &[Signature],
        index: usize,
        body: &str,
        in_section: bool,
    ) -> f64 {
        let signature = &signatures[index];

        let overlap = word_overlap(&comment.text, &remove_wiki_markup(body));

        let ordinal = ORDINAL_WEIGHT / (1.0 + index.abs_diff(comment.index) as f64);

        // A descriptor without a section carries no headline evidence; only
        // an actual mismatch counts against a candidate. In section context
        // the caller already scoped the code, so headline agreement is
        // granted outright.
        let headline = match comment.section_headline() {
            _ if in_section => HEADLINE_WEIGHT,
            None => HEADLINE_WEIGHT,
            Some(expected) => {
                let in_code = headline_re()
                    .captures_iter(&code[..signature.line_start_index])
                    .last()
                    .map(|caps| remove_wiki_markup(&caps[2]));
                if in_code.as_deref() == Some(expected) {
                    HEADLINE_WEIGHT
                } else {
                    0.0
                }
            }
        };

        let continuity = if comment.previous_comments.is_empty() {
            CONTINUITY_WEIGHT
        } else {
            let earlier = &signatures[..index];
            let matched = comment
                .previous_comments
                .iter()
                .filter(|prev| {
                    earlier.iter().any(|s| {
                        s.author == prev.author && timestamp_starts_with(&s.timestamp, &prev.timestamp)
                    })
                })
                .count();
            CONTINUITY_WEIGHT * matched as f64 / comment.previous_comments.len() as f64
        };

        overlap * OVERLAP_WEIGHT + ordinal + headline + continuity
    }

    fn build_source(
        &self,
        comment: &CommentDescriptor,
        code: &str,
        signature: &Signature,
        body: &str,
        score: f64,
    ) -> CommentSource {
        let indentation = signature.indentation_chars.clone();
        let reply_indentation = self.reply_indentation(&indentation);

        let (is_reply_outdented, outdent_level) = self.detect_outdent(code, signature);

        let heading_level = if comment.follows_heading {
            headline_re()
                .captures_iter(&code[..signature.line_start_index])
                .last()
                .and_then(|caps| u8::try_from(caps[1].len()).ok())
        } else {
            None
        };

        CommentSource {
            signature: signature.clone(),
            code: body.to_owned(),
            line_start_index: signature.line_start_index,
            signature_end_index: signature.end_index,
            indentation,
            reply_indentation,
            heading_level,
            is_reply_outdented,
            outdent_level,
            score,
        }
    }

    /// Indentation a reply under a comment with `indentation` should use:
    /// `#` continues a numbered list; otherwise one default character is
    /// appended (mimic) or the whole prefix is unified to the default.
    fn reply_indentation(&self, indentation: &str) -> String {
        if indentation.ends_with('#') {
            return format!("{indentation}#");
        }
        let default = self.config.indentation.default_char;
        match self.config.indentation.mode {
            IndentationMode::Mimic => format!("{indentation}{default}"),
            IndentationMode::Unify => default
                .to_string()
                .repeat(indentation.chars().count() + 1),
        }
    }

    /// Check whether the line following the signature starts with an outdent
    /// template, in which case a reply must account for its level delta.
    fn detect_outdent(&self, code: &str, signature: &Signature) -> (bool, Option<u32>) {
        let Some(outdent_re) = &self.outdent_re else {
            return (false, None);
        };
        let Some(next_line) = code[signature.end_index..]
            .find('\n')
            .map(|p| &code[signature.end_index + p + 1..])
        else {
            return (false, None);
        };
        let Some(caps) = outdent_re.captures(next_line) else {
            return (false, None);
        };
        let level = caps
            .get(1)
            .and_then(|m| m.as_str().trim().parse().ok())
            .or_else(|| u32::try_from(signature.indentation_chars.chars().count() + 1).ok());
        (true, level)
    }
}

fn author_matches(comment: &CommentDescriptor, signature: &Signature) -> bool {
    signature.is_unsigned == comment.is_unsigned && signature.author == comment.author
}

/// The rendered timestamp must equal the candidate's, or be a prefix of it
/// (tolerating trailing timezone variants).
fn timestamp_matches(comment: &CommentDescriptor, signature: &Signature) -> bool {
    timestamp_starts_with(&signature.timestamp, &comment.timestamp)
}

fn timestamp_starts_with(candidate: &str, rendered: &str) -> bool {
    candidate == rendered || candidate.starts_with(rendered)
}

/// Body code of the comment ending at `signatures[index]`: from the line
/// after the previous signature (or the code start) up to the signature.
fn comment_body<'a>(code: &'a str, signatures: &[Signature], index: usize) -> &'a str {
    let signature = &signatures[index];
    let start = if index == 0 {
        0
    } else {
        let prev_end = signatures[index - 1].end_index;
        code[prev_end..]
            .find('\n')
            .map_or(prev_end, |p| prev_end + p + 1)
    };
    let start = start.min(signature.start_index);
    &code[start..signature.start_index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tf_model::PreviousComment;

    const TS1: &str = "12:30, 25 January 2024 (UTC)";
    const TS2: &str = "13:45, 25 January 2024 (UTC)";
    const TS3: &str = "14:00, 25 January 2024 (UTC)";

    fn config() -> SiteConfig {
        SiteConfig::default()
    }

    fn page_code() -> String {
        format!(
            "== First topic ==\n\
             I think we should rename the article to something clearer. \
             [[User:Alice|Alice]] {TS1}\n\
             : I agree with the rename proposal entirely. [[User:Bob|Bob]] {TS2}\n\
             == Second topic ==\n\
             Unrelated question about sources and citations here. \
             [[User:Carol|Carol]] {TS3}\n"
        )
    }

    fn comment(author: &str, timestamp: &str, text: &str, index: usize) -> CommentDescriptor {
        let mut c = CommentDescriptor::new(author, timestamp);
        c.text = text.to_owned();
        c.index = index;
        c
    }

    #[test]
    fn test_acceptance_threshold_pinned() {
        // Encodes accumulated product behavior; changing it changes which
        // comments can be located at all.
        assert!((MATCH_SCORE_THRESHOLD - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_code_fails_with_no_code() {
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let c = comment("Alice", TS1, "whatever", 0);
        let err = locator.locate(&c, None, false).unwrap_err();
        assert_eq!(err.code(), Some("noCode"));
    }

    #[test]
    fn test_no_matching_signature_fails_with_locate_comment() {
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let code = page_code();
        let c = comment("Mallory", TS1, "I think we should rename", 0);
        let err = locator.locate(&c, Some(&code), false).unwrap_err();
        assert_eq!(err.code(), Some("locateComment"));
    }

    #[test]
    fn test_single_exact_match_succeeds() {
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let code = page_code();
        let c = comment(
            "Bob",
            TS2,
            "I agree with the rename proposal entirely.",
            1,
        );
        let source = locator.locate(&c, Some(&code), false).unwrap();
        assert_eq!(source.signature.author, "Bob");
        assert_eq!(source.indentation, ":");
        assert!(source.score > MATCH_SCORE_THRESHOLD);
        assert!(source.code.contains("I agree with the rename"));
    }

    #[test]
    fn test_locator_is_deterministic() {
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let code = page_code();
        let c = comment(
            "Carol",
            TS3,
            "Unrelated question about sources and citations here.",
            2,
        );
        let first = locator.locate(&c, Some(&code), false).unwrap();
        let second = locator.locate(&c, Some(&code), false).unwrap();
        assert_eq!(first.score.to_bits(), second.score.to_bits());
        assert_eq!(first.signature.start_index, second.signature.start_index);
        assert_eq!(first.signature.end_index, second.signature.end_index);
    }

    #[test]
    fn test_text_overlap_picks_among_identical_signatures() {
        // Two signatures by Bob with the identical timestamp; the comment's
        // text overlaps the second. Position noise (index pointing at the
        // first) must not override the text evidence.
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let code = format!(
            "Completely different words appear in this one. [[User:Bob|Bob]] {TS1}\n\
             Specific discussion about citation formatting styles. [[User:Bob|Bob]] {TS1}\n"
        );
        let c = comment(
            "Bob",
            TS1,
            "Specific discussion about citation formatting styles.",
            0,
        );
        let source = locator.locate(&c, Some(&code), false).unwrap();
        assert!(source.code.contains("citation formatting"));
    }

    #[test]
    fn test_equal_score_tiebreak_is_smallest_offset() {
        // The first and third candidates have identical bodies and sit at
        // the same ordinal distance from the target index, so their scores
        // tie exactly; the middle candidate's body does not overlap.
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let code = format!(
            "Same words here. [[User:Bob|Bob]] {TS1}\n\
             Entirely other content. [[User:Bob|Bob]] {TS1}\n\
             Same words here. [[User:Bob|Bob]] {TS1}\n"
        );
        let c = comment("Bob", TS1, "Same words here.", 1);
        let source = locator.locate(&c, Some(&code), false).unwrap();
        // First and third tie on every component; the smaller offset wins.
        assert_eq!(source.signature.line_start_index, 0);
    }

    #[test]
    fn test_headline_mismatch_costs_a_point() {
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let code = page_code();
        let mut c = comment(
            "Carol",
            TS3,
            "Unrelated question about sources and citations here.",
            2,
        );
        c.section = Some(tf_model::SectionRef {
            headline: "Second topic".to_owned(),
            ancestors: vec![],
        });
        let with_match = locator.locate(&c, Some(&code), false).unwrap();
        assert!(with_match.score > MATCH_SCORE_THRESHOLD);

        // A recorded headline that contradicts the code costs the candidate
        // the whole headline component, dropping it to the threshold.
        c.section.as_mut().unwrap().headline = "Wrong headline".to_owned();
        let err = locator.locate(&c, Some(&code), false).unwrap_err();
        assert_eq!(err.code(), Some("locateComment"));

        // In section context the headline is not used as evidence, so the
        // same descriptor locates fine against section-scoped code.
        let section_code = code
            .split("== Second topic ==\n")
            .nth(1)
            .unwrap()
            .to_owned();
        c.index = 0;
        let source = locator.locate(&c, Some(&section_code), true).unwrap();
        assert_eq!(source.signature.author, "Carol");
    }

    #[test]
    fn test_continuity_bonus_with_previous_comments() {
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let code = page_code();
        let mut c = comment(
            "Bob",
            TS2,
            "I agree with the rename proposal entirely.",
            1,
        );
        c.previous_comments = vec![PreviousComment {
            author: "Alice".to_owned(),
            timestamp: TS1.to_owned(),
        }];
        let source = locator.locate(&c, Some(&code), false).unwrap();
        assert!(source.score > MATCH_SCORE_THRESHOLD);
    }

    #[test]
    fn test_reply_indentation_mimic_and_numbered() {
        let config = config();
        let locator = Locator::new(&config).unwrap();
        assert_eq!(locator.reply_indentation(""), ":");
        assert_eq!(locator.reply_indentation("::"), ":::");
        assert_eq!(locator.reply_indentation(":#"), ":##");
    }

    #[test]
    fn test_reply_indentation_unify() {
        let mut config = config();
        config.indentation.mode = IndentationMode::Unify;
        let locator = Locator::new(&config).unwrap();
        assert_eq!(locator.reply_indentation(":*"), ":::");
    }

    #[test]
    fn test_outdent_detection() {
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let code = format!(
            "::: Deep thread comment with plenty of words. [[User:Alice|Alice]] {TS1}\n\
             {{{{outdent|4}}}} Back to the left margin. [[User:Bob|Bob]] {TS2}\n"
        );
        let c = comment(
            "Alice",
            TS1,
            "Deep thread comment with plenty of words.",
            0,
        );
        let source = locator.locate(&c, Some(&code), false).unwrap();
        assert!(source.is_reply_outdented);
        assert_eq!(source.outdent_level, Some(4));
    }

    #[test]
    fn test_heading_level_for_section_opener() {
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let code = page_code();
        let mut c = comment(
            "Alice",
            TS1,
            "I think we should rename the article to something clearer.",
            0,
        );
        c.follows_heading = true;
        let source = locator.locate(&c, Some(&code), false).unwrap();
        assert_eq!(source.heading_level, Some(2));
    }

    #[test]
    fn test_unsigned_comment_matches_unsigned_signature_only() {
        let config = config();
        let locator = Locator::new(&config).unwrap();
        let code = format!(
            "A point someone forgot to sign properly. {{{{unsigned|Dave|{TS1}}}}}\n"
        );
        let mut c = comment("Dave", TS1, "A point someone forgot to sign properly.", 0);
        // Signed descriptor must not bind to the unsigned signature.
        assert!(locator.locate(&c, Some(&code), false).is_err());
        c.is_unsigned = true;
        let source = locator.locate(&c, Some(&code), false).unwrap();
        assert!(source.signature.is_unsigned);
    }
}
