//! Text overlap scoring between rendered comments and wikitext fragments.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Minimum word overlap for a revision diff to count as the origin of a
/// comment.
pub const DIFF_OVERLAP_THRESHOLD: f64 = 0.66;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}_]{3,}").unwrap())
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").unwrap())
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[(?:[^\[\]|]*\|)?([^\[\]|]*)\]\]").unwrap())
}

fn external_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\S+(?:\s+([^\]]+))?\]").unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[A-Za-z][^<>]*>").unwrap())
}

fn heading_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^=+.*=+[ \t]*$").unwrap())
}

fn table_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:\{\||\|\}|\|-|[|!]).*$").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Word overlap between two texts: shared word tokens divided by the size of
/// the token union, case-sensitively. Tokens are runs of 3+ word characters.
///
/// Known precision limitation: the metric does not normalize for very short
/// texts — a two-word comment can score a full overlap against an unrelated
/// two-word fragment. This mirrors accumulated product behavior and is
/// deliberately left uncompensated.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let words_a: BTreeSet<&str> = word_re().find_iter(a).map(|m| m.as_str()).collect();
    let words_b: BTreeSet<&str> = word_re().find_iter(b).map(|m| m.as_str()).collect();
    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    let shared = words_a.intersection(&words_b).count();
    shared as f64 / union as f64
}

/// Strip wiki markup from a code fragment, approximating its rendered text.
///
/// Removes comments, templates, tables, galleries and tags, resolves link
/// labels, drops quote markup, and collapses whitespace. The result is only
/// used for fuzzy word-overlap comparison, not for display.
#[must_use]
pub fn remove_wiki_markup(code: &str) -> String {
    let mut code = comment_re().replace_all(code, " ").into_owned();
    code = heading_line_re().replace_all(&code, " ").into_owned();
    code = remove_balanced(&code, "{{", "}}");
    code = remove_balanced(&code, "{|", "|}");
    code = table_line_re().replace_all(&code, " ").into_owned();
    // Link labels, innermost first so nested file captions resolve too.
    loop {
        let replaced = link_re().replace_all(&code, "$1");
        if replaced == code {
            break;
        }
        code = replaced.into_owned();
    }
    code = external_link_re().replace_all(&code, "$1").into_owned();
    code = tag_re().replace_all(&code, " ").into_owned();
    code = code.replace("'''", "").replace("''", "");
    code = code.replace("&nbsp;", " ").replace("&amp;", "&");
    whitespace_re().replace_all(&code, " ").trim().to_owned()
}

/// Drop balanced delimited spans entirely.
fn remove_balanced(code: &str, open: &str, close: &str) -> String {
    let (open, close) = (open.as_bytes(), close.as_bytes());
    let bytes = code.as_bytes();
    let mut out = String::with_capacity(code.len());
    let mut seg_start = 0;
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == open[0] && bytes[i + 1] == open[1] {
            if depth == 0 {
                out.push_str(&code[seg_start..i]);
            }
            depth += 1;
            i += 2;
            continue;
        }
        if depth > 0 && bytes[i] == close[0] && bytes[i + 1] == close[1] {
            depth -= 1;
            i += 2;
            if depth == 0 {
                seg_start = i;
            }
            continue;
        }
        i += 1;
    }
    if depth == 0 {
        out.push_str(&code[seg_start..]);
    }
    out
}
