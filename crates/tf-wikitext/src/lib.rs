//! Wikitext comment engine: source location and code synthesis.
//!
//! Talk pages are rendered HTML, but edits happen in wikitext. This crate
//! bridges the two directions for discussion comments:
//!
//! - [`Locator`] finds the wikitext source of a rendered comment from its
//!   DOM-derived descriptor (author, timestamp, position, text), scoring
//!   signature candidates against a fixed acceptance threshold.
//! - [`Composer`] assembles submission-ready wikitext from comment-form
//!   input: indentation, list handling, signature, headlines, outdent
//!   templates.
//!
//! Both lean on the hidden-code vault ([`Masker`]) to keep templates,
//! tables, galleries and extension tags intact through every transformation.
//! All components take an injected [`tf_config::SiteConfig`]; nothing reads
//! ambient state, and every operation is pure with respect to its inputs, so
//! the engine is safe to call from a worker thread as long as each
//! invocation owns its own [`Hidden`] map and located sources.
//!
//! # Example
//!
//! ```
//! use tf_config::SiteConfig;
//! use tf_wikitext::{Composer, FormMode, FormState};
//!
//! let config = SiteConfig::default();
//! let composer = Composer::new(&config).unwrap();
//!
//! let mut state = FormState::new(FormMode::Reply);
//! state.indentation = ":".to_owned();
//! let code = composer.synthesize("Hello world", &state).unwrap();
//! assert_eq!(code, ": Hello world ~~~~\n");
//! ```

mod compose;
mod error;
mod lists;
mod mask;
mod revision;
mod signature;
mod similarity;
mod source;
mod timestamp;

pub use compose::{Composer, FormMode, FormState};
pub use error::{ComposeError, Error, MaskError, RevisionError, SetupError, SourceError};
pub use lists::indentation_to_tags;
pub use mask::{
    Hidden, HiddenKind, HiddenSpan, MARKER_END, MARKER_START, Masker, TemplateHandler, unhide,
};
pub use revision::{RevisionCandidate, match_revision};
pub use signature::{ExtraSignature, Signature, SignatureScanner};
pub use similarity::{DIFF_OVERLAP_THRESHOLD, remove_wiki_markup, word_overlap};
pub use source::{CommentSource, Locator, MATCH_SCORE_THRESHOLD};
pub use timestamp::TimestampParser;
