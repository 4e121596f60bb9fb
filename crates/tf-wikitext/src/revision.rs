//! Revision matching: finding the edit that created a comment.
//!
//! Given pre-fetched candidate diffs, only the added-line cells matter. Each
//! candidate's added text is scored against the comment's rendered text with
//! the same word-overlap metric the comment locator uses, with timestamp
//! proximity as the tiebreaker. An exact tie on both keys is a hard failure,
//! never a silent pick.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use tf_model::CommentDescriptor;

use crate::error::{Error, RevisionError};
use crate::similarity::{DIFF_OVERLAP_THRESHOLD, remove_wiki_markup, word_overlap};

fn added_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<td[^>]*class="[^"]*diff-addedline[^"]*"[^>]*>(.*?)</td>"#).unwrap()
    })
}

fn tag_strip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^<>]*>").unwrap())
}

/// One candidate revision with its pre-fetched diff body.
#[derive(Debug, Clone)]
pub struct RevisionCandidate {
    /// Revision id.
    pub revision_id: u64,
    /// Instant the revision was saved.
    pub date: Option<DateTime<Utc>>,
    /// Table-diff HTML of the revision against its parent.
    pub diff_html: String,
}

/// Find the revision whose diff added the comment's text.
///
/// The best candidate wins only if it is unambiguous: a runner-up with
/// identical overlap and identical timestamp proximity fails the match with
/// `diffNotFound`, as does an empty field or one where no candidate reaches
/// [`DIFF_OVERLAP_THRESHOLD`].
pub fn match_revision<'a>(
    comment: &CommentDescriptor,
    candidates: &'a [RevisionCandidate],
) -> Result<&'a RevisionCandidate, Error> {
    let mut scored: Vec<(f64, i64, &RevisionCandidate)> = Vec::new();
    for candidate in candidates {
        let added = extract_added_text(&candidate.diff_html);
        let overlap = word_overlap(&comment.text, &added);
        if overlap < DIFF_OVERLAP_THRESHOLD {
            continue;
        }
        let proximity = match (comment.date, candidate.date) {
            (Some(a), Some(b)) => (a - b).num_minutes().abs(),
            _ => i64::MAX,
        };
        tracing::debug!(
            revision_id = candidate.revision_id,
            overlap,
            proximity,
            "scored revision candidate"
        );
        scored.push((overlap, proximity, candidate));
    }

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });

    match scored.as_slice() {
        [] => Err(RevisionError::DiffNotFound.into()),
        [first, second, ..]
            if (first.0 - second.0).abs() < f64::EPSILON && first.1 == second.1 =>
        {
            Err(RevisionError::DiffNotFound.into())
        }
        [best, ..] => Ok(best.2),
    }
}

/// Pull the added-line cells out of a table diff and reduce them to plain
/// text.
fn extract_added_text(diff_html: &str) -> String {
    let mut added = String::new();
    for caps in added_line_re().captures_iter(diff_html) {
        if !added.is_empty() {
            added.push('\n');
        }
        added.push_str(&caps[1]);
    }
    let stripped = tag_strip_re().replace_all(&added, " ");
    remove_wiki_markup(&stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn diff(added: &[&str]) -> String {
        added
            .iter()
            .map(|line| {
                format!(
                    r#"<tr><td class="diff-marker"></td><td class="diff-addedline"><div>{line}</div></td></tr>"#
                )
            })
            .collect()
    }

    fn comment(text: &str) -> CommentDescriptor {
        let mut c = CommentDescriptor::new("Alice", "ts");
        c.text = text.to_owned();
        c
    }

    fn candidate(id: u64, minute: u32, added: &[&str]) -> RevisionCandidate {
        RevisionCandidate {
            revision_id: id,
            date: Some(Utc.with_ymd_and_hms(2024, 1, 25, 12, minute, 0).unwrap()),
            diff_html: diff(added),
        }
    }

    #[test]
    fn test_matches_revision_with_added_text() {
        let candidates = vec![
            candidate(1, 0, &["Something else entirely was written"]),
            candidate(2, 5, &["This exact comment about citations appeared"]),
        ];
        let c = comment("This exact comment about citations appeared");
        let found = match_revision(&c, &candidates).unwrap();
        assert_eq!(found.revision_id, 2);
    }

    #[test]
    fn test_no_candidate_over_threshold_fails() {
        let candidates = vec![candidate(1, 0, &["Unrelated words only here"])];
        let c = comment("Completely different comment text");
        let err = match_revision(&c, &candidates).unwrap_err();
        assert_eq!(err.code(), Some("diffNotFound"));
    }

    #[test]
    fn test_empty_candidates_fail() {
        let c = comment("anything");
        assert!(match_revision(&c, &[]).is_err());
    }

    #[test]
    fn test_proximity_breaks_overlap_tie() {
        let mut c = comment("The very same added sentence");
        c.date = Some(Utc.with_ymd_and_hms(2024, 1, 25, 12, 6, 0).unwrap());
        let candidates = vec![
            candidate(1, 0, &["The very same added sentence"]),
            candidate(2, 5, &["The very same added sentence"]),
        ];
        let found = match_revision(&c, &candidates).unwrap();
        assert_eq!(found.revision_id, 2);
    }

    #[test]
    fn test_exact_tie_is_hard_failure() {
        let mut c = comment("The very same added sentence");
        c.date = Some(Utc.with_ymd_and_hms(2024, 1, 25, 12, 3, 0).unwrap());
        // Both candidates: identical overlap, both 3 minutes away.
        let candidates = vec![
            candidate(1, 0, &["The very same added sentence"]),
            candidate(2, 6, &["The very same added sentence"]),
        ];
        let err = match_revision(&c, &candidates).unwrap_err();
        assert_eq!(err.code(), Some("diffNotFound"));
    }

    #[test]
    fn test_markup_stripped_from_diff() {
        let candidates = vec![candidate(
            1,
            0,
            &["<ins>Support</ins> the '''rename''' [[proposal|proposal]] wholeheartedly today"],
        )];
        let c = comment("Support the rename proposal wholeheartedly today");
        let found = match_revision(&c, &candidates).unwrap();
        assert_eq!(found.revision_id, 1);
    }
}
