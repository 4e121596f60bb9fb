//! Hidden-code vault: reversible masking of opaque wikitext spans.
//!
//! The text algorithms in this crate have no formal wikitext grammar to lean
//! on. Before transforming code they replace "sensitive" spans — HTML
//! comments, extension tags, templates, tables, galleries — with single
//! placeholder tokens, work on the simplified skeleton, and restore the spans
//! afterwards. The side table of [`HiddenSpan`]s is authoritative; the token
//! embeds the span's index and kind so the kind can be recovered without a
//! lookup.
//!
//! Token format: `\x01<index>_<kind>\x02`, index 1-based and contiguous.
//! Input that already contains the marker characters is rejected with
//! [`MaskError::MarkerCollision`] rather than silently corrupted.

use crate::error::{Error, MaskError, SetupError};
use regex::Regex;
use std::sync::OnceLock;

/// First marker character delimiting a placeholder token.
pub const MARKER_START: char = '\u{1}';
/// Second marker character delimiting a placeholder token.
pub const MARKER_END: char = '\u{2}';

/// Extension tags whose content is always hidden.
const BUILTIN_HIDDEN_TAGS: [&str; 4] = ["nowiki", "pre", "source", "syntaxhighlight"];

/// Block-level HTML tags hidden by the composition pass so that newline
/// handling treats them atomically.
const BLOCK_TAGS: [&str; 7] = ["blockquote", "div", "dl", "ol", "pre", "table", "ul"];

/// Kind of a hidden span, recoverable from the token itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenKind {
    /// HTML comment (`<!-- -->`).
    Comment,
    /// Extension tag span (`<nowiki>`, `<pre>`, configured custom tags).
    Tag,
    /// Template (`{{...}}`).
    Template,
    /// Table (`{|...|}`).
    Table,
    /// Gallery (`<gallery>...</gallery>`).
    Gallery,
    /// Internal link (`[[...]]`).
    Link,
    /// Block-level HTML element.
    Block,
}

impl HiddenKind {
    /// Discriminator embedded in the placeholder token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Tag => "tag",
            Self::Template => "template",
            Self::Table => "table",
            Self::Gallery => "gallery",
            Self::Link => "link",
            Self::Block => "block",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "comment" => Some(Self::Comment),
            "tag" => Some(Self::Tag),
            "template" => Some(Self::Template),
            "table" => Some(Self::Table),
            "gallery" => Some(Self::Gallery),
            "link" => Some(Self::Link),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

/// One hidden span: its kind, the tag name for tag-like spans, and the
/// original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenSpan {
    /// Span kind.
    pub kind: HiddenKind,
    /// Lowercased tag name for `Tag`/`Block`/`Gallery` spans.
    pub tag_name: Option<String>,
    /// Original text, byte-identical to the input slice (template spans may
    /// have been transformed by the template handler).
    pub text: String,
}

/// Result of hiding: the skeleton code and the side table.
#[derive(Debug, Clone)]
pub struct Hidden {
    /// Code with sensitive spans replaced by placeholder tokens.
    pub code: String,
    /// Hidden spans, in token-index order.
    pub spans: Vec<HiddenSpan>,
}

impl Hidden {
    /// Restore every hidden span.
    #[must_use]
    pub fn unhide_all(&self) -> String {
        unhide(&self.code, &self.spans, None)
    }
}

/// Handler applied to each top-level piped argument value of a template
/// before the template is vaulted. Receives code in which nested templates
/// are already placeholder tokens.
pub type TemplateHandler<'h> = &'h mut dyn FnMut(&str) -> Result<String, Error>;

fn token(index: usize, kind: HiddenKind) -> String {
    format!("{MARKER_START}{index}_{}{MARKER_END}", kind.as_str())
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("\u{1}([0-9]+)_([a-z]+)\u{2}").unwrap())
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").unwrap())
}

fn gallery_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?si)<gallery(?:[ \t][^>]*)?>.*?</gallery[ \t]*>").unwrap())
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[[^\[\]]*?\]\]").unwrap())
}

fn block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&tag_span_pattern(&BLOCK_TAGS.map(str::to_owned))).unwrap())
}

fn tag_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<([A-Za-z][A-Za-z0-9]*)").unwrap())
}

/// Alternation matching a full open..close span (or self-closing form) for
/// each tag name. The regex crate has no backreferences, so each name gets
/// its own arm.
fn tag_span_pattern(names: &[String]) -> String {
    let arms: Vec<String> = names
        .iter()
        .map(|n| {
            let n = regex::escape(n);
            format!("<{n}(?:[ \\t][^>]*)?>.*?</{n}[ \\t]*>|<{n}(?:[ \\t][^>]*)?/>")
        })
        .collect();
    format!("(?si){}", arms.join("|"))
}

/// Masks and restores sensitive wikitext spans.
///
/// Compiled once per site configuration; all methods are pure with respect to
/// their inputs, so one `Masker` can serve any number of concurrent
/// transformation passes as long as each pass owns its own [`Hidden`].
#[derive(Debug)]
pub struct Masker {
    tag_re: Regex,
}

impl Masker {
    /// Build a masker recognizing the built-in extension tags plus the
    /// configured custom tag names.
    pub fn new(custom_tags: &[String]) -> Result<Self, SetupError> {
        let mut names: Vec<String> = BUILTIN_HIDDEN_TAGS.map(str::to_owned).to_vec();
        names.extend(custom_tags.iter().cloned());
        let tag_re = Regex::new(&tag_span_pattern(&names))?;
        Ok(Self { tag_re })
    }

    /// Hide the standard span set: comments, extension tags, templates,
    /// tables, galleries.
    pub fn hide(&self, code: &str) -> Result<Hidden, Error> {
        self.hide_inner(code, None, false)
    }

    /// Hide the composition span set: the standard set plus links and
    /// block-level HTML elements, with `handler` applied to template
    /// arguments.
    ///
    /// The handler is applied to each top-level piped argument value of every
    /// template (innermost templates are already tokens at that point), so a
    /// quote or list typed inside a template argument goes through the same
    /// processing as top-level text.
    pub fn hide_for_composition(
        &self,
        code: &str,
        handler: TemplateHandler<'_>,
    ) -> Result<Hidden, Error> {
        self.hide_inner(code, Some(handler), true)
    }

    fn hide_inner(
        &self,
        code: &str,
        mut handler: Option<TemplateHandler<'_>>,
        composition: bool,
    ) -> Result<Hidden, Error> {
        if code.contains(MARKER_START) || code.contains(MARKER_END) {
            return Err(MaskError::MarkerCollision.into());
        }

        let mut spans = Vec::new();
        let mut code = hide_regex_pass(code, comment_re(), HiddenKind::Comment, &mut spans);
        code = hide_regex_pass(&code, &self.tag_re, HiddenKind::Tag, &mut spans);
        code = hide_templates(&code, &mut spans, &mut handler)?;
        code = hide_delimited(&code, "{|", "|}", HiddenKind::Table, &mut spans);
        code = hide_regex_pass(&code, gallery_re(), HiddenKind::Gallery, &mut spans);
        if composition {
            code = hide_regex_pass(&code, link_re(), HiddenKind::Link, &mut spans);
            code = hide_regex_pass(&code, block_re(), HiddenKind::Block, &mut spans);
        }
        Ok(Hidden { code, spans })
    }

    /// Same-length masking for offset-stable scanning: comment and extension
    /// tag spans are overwritten with filler bytes, and newlines embedded in
    /// templates and tables are neutralized, so that logical lines can be
    /// computed while every byte offset stays valid in the original code.
    #[must_use]
    pub fn mask_distracting_code(&self, code: &str) -> String {
        let mut bytes = code.as_bytes().to_vec();
        for re in [comment_re(), &self.tag_re] {
            for m in re.find_iter(code) {
                bytes[m.start()..m.end()].fill(1);
            }
        }
        neutralize_newlines(&mut bytes, b"{{", b"}}");
        neutralize_newlines(&mut bytes, b"{|", b"|}");
        // Only ASCII bytes were written, so the buffer is still valid UTF-8.
        String::from_utf8(bytes).expect("same-length masking produced invalid UTF-8")
    }
}

fn hide_regex_pass(
    code: &str,
    re: &Regex,
    kind: HiddenKind,
    spans: &mut Vec<HiddenSpan>,
) -> String {
    let mut out = String::with_capacity(code.len());
    let mut last = 0;
    for m in re.find_iter(code) {
        out.push_str(&code[last..m.start()]);
        let tag_name = match kind {
            HiddenKind::Tag | HiddenKind::Block | HiddenKind::Gallery => tag_name_re()
                .captures(m.as_str())
                .map(|c| c[1].to_lowercase()),
            _ => None,
        };
        spans.push(HiddenSpan {
            kind,
            tag_name,
            text: m.as_str().to_owned(),
        });
        out.push_str(&token(spans.len(), kind));
        last = m.end();
    }
    out.push_str(&code[last..]);
    out
}

/// Hide balanced `{{...}}` spans, outermost-first with recursion into the
/// content so that nested templates become tokens of their own before the
/// handler sees the outer template's arguments.
fn hide_templates(
    code: &str,
    spans: &mut Vec<HiddenSpan>,
    handler: &mut Option<TemplateHandler<'_>>,
) -> Result<String, Error> {
    let bytes = code.as_bytes();
    let mut out = String::with_capacity(code.len());
    let mut seg_start = 0;
    let mut span_start = 0;
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            if depth == 0 {
                out.push_str(&code[seg_start..i]);
                span_start = i;
            }
            depth += 1;
            i += 2;
            continue;
        }
        if depth > 0 && bytes[i] == b'}' && bytes[i + 1] == b'}' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                let inner = &code[span_start + 2..i - 2];
                let inner = hide_templates(inner, spans, handler)?;
                let inner = match handler {
                    Some(h) => process_template_arguments(&inner, h)?,
                    None => inner,
                };
                spans.push(HiddenSpan {
                    kind: HiddenKind::Template,
                    tag_name: None,
                    text: format!("{{{{{inner}}}}}"),
                });
                out.push_str(&token(spans.len(), HiddenKind::Template));
                seg_start = i;
            }
            continue;
        }
        i += 1;
    }
    if depth > 0 {
        // Unbalanced braces: leave the tail untouched.
        out.push_str(&code[span_start..]);
    } else {
        out.push_str(&code[seg_start..]);
    }
    Ok(out)
}

/// Apply `handler` to each top-level piped argument value of a template body
/// (the text between the braces). Nested templates are already tokens, so
/// only `[[...]]` nesting needs tracking for the pipe split.
fn process_template_arguments(
    body: &str,
    handler: &mut TemplateHandler<'_>,
) -> Result<String, Error> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut link_depth = 0usize;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' if chars.peek() == Some(&'[') => {
                chars.next();
                link_depth += 1;
                current.push_str("[[");
            }
            ']' if link_depth > 0 && chars.peek() == Some(&']') => {
                chars.next();
                link_depth -= 1;
                current.push_str("]]");
            }
            '|' if link_depth == 0 => {
                parts.push(std::mem::take(&mut current));
                parts.push("|".to_owned());
            }
            _ => current.push(c),
        }
    }
    parts.push(current);

    let mut out = String::with_capacity(body.len());
    for (i, part) in parts.iter().enumerate() {
        if part == "|" || i == 0 {
            // Separators and the template name pass through untouched.
            out.push_str(part);
            continue;
        }
        match part.split_once('=') {
            Some((name, value)) if !name.contains(['{', '}', '<', '>', '[', ']']) => {
                out.push_str(name);
                out.push('=');
                out.push_str(&handler(value)?);
            }
            _ => out.push_str(&handler(part)?),
        }
    }
    Ok(out)
}

/// Hide balanced two-character-delimited spans (tables), outermost-first.
fn hide_delimited(
    code: &str,
    open: &str,
    close: &str,
    kind: HiddenKind,
    spans: &mut Vec<HiddenSpan>,
) -> String {
    let (open, close) = (open.as_bytes(), close.as_bytes());
    let bytes = code.as_bytes();
    let mut out = String::with_capacity(code.len());
    let mut seg_start = 0;
    let mut span_start = 0;
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == open[0] && bytes[i + 1] == open[1] {
            if depth == 0 {
                out.push_str(&code[seg_start..i]);
                span_start = i;
            }
            depth += 1;
            i += 2;
            continue;
        }
        if depth > 0 && bytes[i] == close[0] && bytes[i + 1] == close[1] {
            depth -= 1;
            i += 2;
            if depth == 0 {
                spans.push(HiddenSpan {
                    kind,
                    tag_name: None,
                    text: code[span_start..i].to_owned(),
                });
                out.push_str(&token(spans.len(), kind));
                seg_start = i;
            }
            continue;
        }
        i += 1;
    }
    if depth > 0 {
        out.push_str(&code[span_start..]);
    } else {
        out.push_str(&code[seg_start..]);
    }
    out
}

fn neutralize_newlines(bytes: &mut [u8], open: &[u8; 2], close: &[u8; 2]) {
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == open[0] && bytes[i + 1] == open[1] {
            depth += 1;
            i += 2;
            continue;
        }
        if depth > 0 && bytes[i] == close[0] && bytes[i + 1] == close[1] {
            depth -= 1;
            i += 2;
            continue;
        }
        if depth > 0 && bytes[i] == b'\n' {
            bytes[i] = 1;
        }
        i += 1;
    }
}

/// Restore placeholder tokens from the side table.
///
/// When `only` is given, just tokens of that kind are restored and the rest
/// are left in place. Unhiding text that contains no tokens returns it
/// unchanged. Restoration loops until no replaceable token remains, so spans
/// whose text itself contains tokens (nested templates) are fully restored.
///
/// Panics if a token references an index outside the side table: that is a
/// core invariant violation, not a wikitext-content issue.
#[must_use]
pub fn unhide(code: &str, spans: &[HiddenSpan], only: Option<HiddenKind>) -> String {
    let mut code = code.to_owned();
    // Each pass can only expose tokens stored in span texts; spans.len() + 1
    // passes is a safe upper bound.
    for _ in 0..=spans.len() {
        let replaced = token_re().replace_all(&code, |caps: &regex::Captures<'_>| {
            let index: usize = caps[1].parse().expect("token index is numeric");
            let kind = HiddenKind::from_str(&caps[2]);
            let span = spans
                .get(index.wrapping_sub(1))
                .unwrap_or_else(|| panic!("unknown hidden-code token index {index}"));
            match only {
                Some(k) if Some(k) != kind => caps[0].to_owned(),
                _ => span.text.clone(),
            }
        });
        if replaced == code {
            break;
        }
        code = replaced.into_owned();
    }
    code
}
