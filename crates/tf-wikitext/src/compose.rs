//! Comment code synthesis: from comment-form input to submission-ready
//! wikitext.
//!
//! The pipeline hides sensitive code, processes the body fragment by
//! fragment (recursively inside template arguments), resolves signature and
//! indentation, inserts headlines and outdent templates, and restores the
//! hidden spans. Structural conflicts — markup that cannot be rendered under
//! the requested indentation — fail fast with a typed error before any
//! wikitext is produced.

use regex::Regex;
use std::sync::OnceLock;
use tf_config::SiteConfig;

use crate::error::{ComposeError, Error, SetupError};
use crate::lists;
use crate::mask::{Hidden, Masker, unhide};
use crate::source::CommentSource;

/// What the comment form is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    /// Reply to a comment.
    Reply,
    /// Edit an existing comment.
    Edit,
    /// Add a new top-level section.
    AddSection,
    /// Add a subsection under an existing section.
    AddSubsection,
    /// Reply at the end of a section rather than under a specific comment.
    ReplyInSection,
}

/// Resolved input state of a comment form.
#[derive(Debug, Clone)]
pub struct FormState {
    /// Form mode.
    pub mode: FormMode,
    /// Lead indentation for the first line.
    pub indentation: String,
    /// Indentation for continuation lines; derived from `indentation` when
    /// not set explicitly.
    pub rest_lines_indentation: Option<String>,
    /// Signature text appended to the body; empty when omitted.
    pub signature: String,
    /// Whether the whole comment should render in small font.
    pub wrap_in_small: bool,
    /// Headline for section-opening modes.
    pub headline: Option<String>,
    /// Heading level of the target: the parent section for subsections, the
    /// original heading when editing a section opener.
    pub target_heading_level: Option<u8>,
    /// Outdent level delta when the reply target is outdented.
    pub outdent_level: Option<u32>,
    /// Preview mode: approximate nesting with neutral `:` indentation.
    pub preview: bool,
}

impl FormState {
    /// State with the given mode and empty context; the dedicated
    /// constructors below fill fields from located sources.
    #[must_use]
    pub fn new(mode: FormMode) -> Self {
        Self {
            mode,
            indentation: String::new(),
            rest_lines_indentation: None,
            signature: " ~~~~".to_owned(),
            wrap_in_small: false,
            headline: None,
            target_heading_level: None,
            outdent_level: None,
            preview: false,
        }
    }

    /// State for replying to a located comment.
    #[must_use]
    pub fn reply(source: &CommentSource) -> Self {
        Self {
            indentation: source.reply_indentation.clone(),
            outdent_level: source.is_reply_outdented.then_some(source.outdent_level).flatten(),
            ..Self::new(FormMode::Reply)
        }
    }

    /// State for editing a located comment in place.
    #[must_use]
    pub fn edit(source: &CommentSource) -> Self {
        Self {
            indentation: source.indentation.clone(),
            target_heading_level: source.heading_level,
            ..Self::new(FormMode::Edit)
        }
    }

    /// State for opening a new top-level section.
    #[must_use]
    pub fn add_section(headline: impl Into<String>) -> Self {
        Self {
            headline: Some(headline.into()),
            ..Self::new(FormMode::AddSection)
        }
    }

    /// State for opening a subsection under a section of `parent_level`.
    #[must_use]
    pub fn add_subsection(headline: impl Into<String>, parent_level: u8) -> Self {
        Self {
            headline: Some(headline.into()),
            target_heading_level: Some(parent_level),
            ..Self::new(FormMode::AddSubsection)
        }
    }

    /// State for replying at the end of a section. The indentation continues
    /// a numbered list when the section's last comment sits in one, else it
    /// is the default indentation character.
    #[must_use]
    pub fn reply_in_section(last: Option<&CommentSource>, config: &SiteConfig) -> Self {
        let indentation = match last {
            Some(source) if source.indentation.starts_with('#') => "#".to_owned(),
            _ => config.indentation.default_char.to_string(),
        };
        Self {
            indentation,
            ..Self::new(FormMode::ReplyInSection)
        }
    }

    /// Continuation-line indentation: `*` and `;` cannot start continuation
    /// lines without opening new items, so they become `:`; `#` stays to
    /// keep numbering intact.
    #[must_use]
    pub fn rest_indentation(&self) -> String {
        self.rest_lines_indentation.clone().unwrap_or_else(|| {
            self.indentation
                .chars()
                .map(|c| if c == '#' { '#' } else { ':' })
                .collect()
        })
    }
}

/// Per-fragment processing context.
#[derive(Debug, Clone)]
struct FragmentContext {
    indented: bool,
    rest_indentation: String,
    in_tag: bool,
}

fn leading_space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]+").unwrap())
}

fn blank_runs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

fn trailing_tildes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:[ \t\u{a0}]*~{3,5})+[ \t]*$").unwrap())
}

fn structural_token_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^\u{1}[0-9]+_(?:table|gallery)\u{2}").unwrap())
}

fn entire_block_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^\u{1}[0-9]+_(?:block|table|gallery)\u{2}$").unwrap())
}

fn block_token_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("\u{1}[0-9]+_(?:block|table|gallery)\u{2}$").unwrap())
}

fn block_token_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^\u{1}[0-9]+_(?:block|table|gallery)\u{2}").unwrap())
}

fn heading_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^=+.*=+[ \t]*$").unwrap())
}

fn entire_link_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^\u{1}[0-9]+_link\u{2}$").unwrap())
}

/// Synthesizes submission-ready wikitext from comment-form input.
#[derive(Debug)]
pub struct Composer<'c> {
    config: &'c SiteConfig,
    masker: Masker,
}

impl<'c> Composer<'c> {
    /// Build a composer from site configuration.
    pub fn new(config: &'c SiteConfig) -> Result<Self, SetupError> {
        Ok(Self {
            config,
            masker: Masker::new(&config.hidden_tags)?,
        })
    }

    /// Assemble the final wikitext for a submitted comment form.
    pub fn synthesize(&self, input: &str, state: &FormState) -> Result<String, Error> {
        let indented = !state.indentation.is_empty();
        let rest_indentation = state.rest_indentation();

        // Template arguments are processed as tag-wrapped fragments: list
        // markup does not render inside them.
        let nested_ctx = FragmentContext {
            indented,
            rest_indentation: rest_indentation.clone(),
            in_tag: true,
        };
        let mut handler =
            |fragment: &str| -> Result<String, Error> { self.process_fragment(fragment, &nested_ctx) };
        let Hidden { mut code, spans } = self
            .masker
            .hide_for_composition(input.trim(), &mut handler)?;

        let mut use_small = state.wrap_in_small;
        if let Some(inner) = unwrap_small(&code) {
            code = inner;
            use_small = true;
        }

        let ctx = FragmentContext {
            indented,
            rest_indentation,
            in_tag: use_small,
        };
        code = self.process_fragment(&code, &ctx)?;

        // Resubmission hygiene: never double the signature tildes.
        code = trailing_tildes_re().replace(code.trim_end(), "").into_owned();

        let mut signature = state.signature.clone();
        if !ctx.indented && !signature.is_empty() && ends_with_list_markup(&code) {
            // Unterminated list markup would swallow the signature line.
            code.push('\n');
            signature = signature.trim_start().to_owned();
        }

        code = if use_small {
            self.wrap_small(&code, &signature)
        } else {
            format!("{code}{signature}")
        };

        if let Some(headline) = &state.headline {
            code = insert_headline(&code, headline, state);
        }

        if let Some(level) = state.outdent_level {
            code = self.insert_outdent(&code, level);
        }

        if state.mode != FormMode::Edit {
            code.push('\n');
        }

        let lead = if state.preview {
            ":".repeat(state.indentation.chars().count())
        } else {
            state.indentation.clone()
        };
        if !lead.is_empty() {
            let space = if self.config.indentation.space_after { " " } else { "" };
            code = format!("{lead}{space}{code}");
        }

        Ok(unhide(&code, &spans, None))
    }

    /// Process one code fragment: leading-space and blank-line hygiene, list
    /// conversion, conflict validation, and newline resolution. Applied to
    /// the top-level body and, through the template handler, to every hidden
    /// template argument.
    fn process_fragment(&self, code: &str, ctx: &FragmentContext) -> Result<String, Error> {
        let mut code = code.replace("\r\n", "\n");

        if ctx.indented {
            code = leading_space_re().replace_all(&code, "").into_owned();
            if self.config.templates.paragraph.is_empty() {
                code = blank_runs_re().replace_all(&code, "\n\n").into_owned();
            }
        }

        let numbered = ctx.rest_indentation.contains('#');
        if numbered {
            if code.contains("_table\u{2}") || code.contains("{|") {
                return Err(ComposeError::NumberedListTable.into());
            }
            if code.contains("_gallery\u{2}") || code.contains("<gallery") {
                return Err(ComposeError::NumberedListGallery.into());
            }
        }

        if ctx.indented && (ctx.in_tag || numbered) {
            code = convert_list_regions(&code);
        }

        Ok(self.join_lines(&code, ctx))
    }

    /// Resolve every newline of the fragment: `<br>`, bare newline with
    /// continuation indentation, paragraph separator, or nothing.
    fn join_lines(&self, code: &str, ctx: &FragmentContext) -> String {
        let mut out = String::with_capacity(code.len());
        let mut prev: Option<&str> = None;
        let mut had_blank = false;

        for line in code.split('\n') {
            if line.trim().is_empty() {
                if prev.is_some() {
                    had_blank = true;
                }
                continue;
            }
            match prev {
                None => out.push_str(line),
                Some(prev) => {
                    if ctx.indented {
                        self.join_indented(&mut out, prev, line, had_blank, ctx);
                    } else {
                        self.join_unindented(&mut out, prev, line, had_blank);
                    }
                }
            }
            prev = Some(line);
            had_blank = false;
        }
        out
    }

    fn join_indented(
        &self,
        out: &mut String,
        prev: &str,
        line: &str,
        had_blank: bool,
        ctx: &FragmentContext,
    ) {
        if needs_line_start(line) {
            // Line-oriented markup must start its line, carrying the
            // continuation indentation; a blank run collapses into the
            // line break.
            out.push('\n');
            out.push_str(&ctx.rest_indentation);
            out.push_str(line);
        } else if needs_line_start(prev) {
            out.push('\n');
            out.push_str(&ctx.rest_indentation);
            if self.config.indentation.space_after {
                out.push(' ');
            }
            out.push_str(line);
        } else if had_blank {
            out.push_str(&self.paragraph_separator());
            out.push_str(line);
        } else if is_block_boundary_end(prev) || is_block_boundary_start(line) {
            // Indentation implies a literal line break already; a raw
            // newline would end the list item, so it is dropped.
            out.push_str(line);
        } else {
            out.push_str("<br>");
            out.push_str(line);
        }
    }

    fn join_unindented(&self, out: &mut String, prev: &str, line: &str, had_blank: bool) {
        if had_blank {
            out.push_str("\n\n");
            out.push_str(line);
        } else if self.keeps_bare_newline(prev, line) {
            out.push('\n');
            out.push_str(line);
        } else {
            out.push_str("<br>\n");
            out.push_str(line);
        }
    }

    /// Whether the newline between two unindented lines stays bare instead
    /// of becoming `<br>`.
    fn keeps_bare_newline(&self, prev: &str, line: &str) -> bool {
        entire_block_token_re().is_match(prev)
            || entire_block_token_re().is_match(line)
            || heading_line_re().is_match(line)
            || heading_line_re().is_match(prev)
            || line.starts_with("----")
            || prev.starts_with("----")
            || needs_line_start(line)
            || is_block_boundary_end(prev)
            || is_block_boundary_start(line)
            || is_standalone_media_line(line)
            || self.is_paragraph_marker_boundary(prev, line)
    }

    fn is_paragraph_marker_boundary(&self, prev: &str, line: &str) -> bool {
        self.config.templates.paragraph.iter().any(|name| {
            let marker = format!("{{{{{name}}}}}");
            prev.ends_with(&marker) || line.starts_with(&marker)
        })
    }

    fn paragraph_separator(&self) -> String {
        self.config.templates.paragraph.first().map_or_else(
            || "<br><br>".to_owned(),
            |name| format!("{{{{{name}}}}}"),
        )
    }

    fn wrap_small(&self, code: &str, signature: &str) -> String {
        if let Some(name) = self.config.templates.small_div.first() {
            if code.contains('\n') {
                // Block content routes through the small-div template; pipes
                // in the visible text must not read as argument separators.
                let escaped = code.replace('|', "{{!}}");
                return format!("{{{{{name}|1={escaped}{signature}}}}}");
            }
        }
        format!("<small>{code}{signature}</small>")
    }

    fn insert_outdent(&self, code: &str, level: u32) -> String {
        let name = self
            .config
            .templates
            .outdent
            .first()
            .map_or("outdent", String::as_str);
        let sep = if code.starts_with([':', '*', '#', ';']) { "\n" } else { " " };
        format!("{{{{{name}|{level}}}}}{sep}{code}")
    }
}

fn insert_headline(code: &str, headline: &str, state: &FormState) -> String {
    let level = match state.mode {
        FormMode::AddSection => 2,
        FormMode::AddSubsection => state
            .target_heading_level
            .unwrap_or(2)
            .saturating_add(1)
            .min(6),
        _ => state.target_heading_level.unwrap_or(2),
    };
    let eq = "=".repeat(usize::from(level));
    // A new top-level section is visually separated from prior content.
    let lead = if state.mode == FormMode::AddSection { "\n" } else { "" };
    format!("{lead}{eq} {headline} {eq}\n{code}")
}

/// Whether a line must begin a physical line to render: list markup, table
/// or gallery openings, or a hidden table/gallery token.
fn needs_line_start(line: &str) -> bool {
    lists::is_list_line(line)
        || line.starts_with("{|")
        || line.to_ascii_lowercase().starts_with("<gallery")
        || structural_token_start_re().is_match(line)
}

fn is_block_boundary_end(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let close_re = RE.get_or_init(|| {
        Regex::new(r"(?i)</(?:blockquote|div|dl|ol|pre|table|ul)>[ \t]*$").unwrap()
    });
    block_token_end_re().is_match(line) || close_re.is_match(line)
}

fn is_block_boundary_start(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let open_re = RE.get_or_init(|| {
        Regex::new(r"(?i)^<(?:blockquote|div|dl|ol|pre|table|ul)(?:[ >]|$)").unwrap()
    });
    block_token_start_re().is_match(line) || open_re.is_match(line)
}

/// A line that is a standalone media inclusion (an image or gallery of its
/// own): after hiding, such a line is a single link or gallery token.
fn is_standalone_media_line(line: &str) -> bool {
    entire_link_token_re().is_match(line)
        || line.to_ascii_lowercase().starts_with("<gallery")
        || line.starts_with("[[File:")
        || line.starts_with("[[Image:")
}

fn ends_with_list_markup(code: &str) -> bool {
    code.rsplit('\n').next().is_some_and(lists::is_list_line)
}

/// Strip a top-level `<small>` wrapper, unless the inner text itself closes
/// a small tag (ambiguous: left as-is).
fn unwrap_small(code: &str) -> Option<String> {
    let inner = code.strip_prefix("<small>")?.strip_suffix("</small>")?;
    if inner.contains("</small>") {
        return None;
    }
    Some(inner.trim().to_owned())
}

/// Convert each contiguous run of list-marked lines to tag form, leaving the
/// surrounding lines untouched.
fn convert_list_regions(code: &str) -> String {
    let lines: Vec<&str> = code.split('\n').collect();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if lists::is_list_line(lines[i]) {
            let mut j = i;
            while j < lines.len() && lists::is_list_line(lines[j]) {
                j += 1;
            }
            out.push(lists::indentation_to_tags(&lines[i..j].join("\n")));
            i = j;
        } else {
            out.push((*lines[i]).to_owned());
            i += 1;
        }
    }
    out.join("\n")
}
