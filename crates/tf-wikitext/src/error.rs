//! Error types for the wikitext engine.
//!
//! Expected failure modes carry a stable `code()` string that a UI layer can
//! map to localized messages. Internal invariant violations (for example an
//! unhide call referencing an unknown placeholder) panic instead: they
//! indicate a bug in the engine, not a property of the wikitext.

/// Error from the hidden-code vault.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MaskError {
    /// The input already contains the control characters used for
    /// placeholder tokens; masking it would make unmasking ambiguous.
    #[error("input already contains placeholder marker characters")]
    MarkerCollision,
}

/// Error building an engine component from site configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// A configured pattern did not compile.
    #[error("could not build pattern from configuration: {0}")]
    Pattern(#[from] regex::Error),
}

/// Error locating a comment's source in wikitext.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SourceError {
    /// The caller asked to locate a comment before loading any code.
    #[error("page code was not loaded before locating the comment")]
    NoCode,

    /// No signature candidate scored above the acceptance threshold.
    #[error("could not find the comment in the source code")]
    LocateComment,
}

impl SourceError {
    /// Stable error code for UI message lookup.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCode => "noCode",
            Self::LocateComment => "locateComment",
        }
    }
}

/// Structural conflict while synthesizing comment code.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ComposeError {
    /// Table markup cannot continue a numbered-list indentation without
    /// breaking the numbering.
    #[error("table markup cannot be used in a comment with numbered-list indentation")]
    NumberedListTable,

    /// Gallery markup cannot continue a numbered-list indentation.
    #[error("gallery markup cannot be used in a comment with numbered-list indentation")]
    NumberedListGallery,
}

impl ComposeError {
    /// Stable error code for UI message lookup.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NumberedListTable => "numberedList-table",
            Self::NumberedListGallery => "numberedList",
        }
    }
}

/// Error matching a comment against candidate revision diffs.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RevisionError {
    /// No candidate diff matched unambiguously.
    #[error("could not find an unambiguous revision for the comment")]
    DiffNotFound,
}

impl RevisionError {
    /// Stable error code for UI message lookup.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DiffNotFound => "diffNotFound",
        }
    }
}

/// Any error the engine surfaces to callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Hidden-code vault precondition violation.
    #[error(transparent)]
    Mask(#[from] MaskError),

    /// Component construction failure.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Comment location failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Comment code synthesis failure.
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// Revision matching failure.
    #[error(transparent)]
    Revision(#[from] RevisionError),
}

impl Error {
    /// Stable error code for UI message lookup, when the failure mode is an
    /// expected one.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Mask(_) | Self::Setup(_) => None,
            Self::Source(e) => Some(e.code()),
            Self::Compose(e) => Some(e.code()),
            Self::Revision(e) => Some(e.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_codes() {
        assert_eq!(SourceError::NoCode.code(), "noCode");
        assert_eq!(SourceError::LocateComment.code(), "locateComment");
        assert_eq!(ComposeError::NumberedListTable.code(), "numberedList-table");
        assert_eq!(ComposeError::NumberedListGallery.code(), "numberedList");
        assert_eq!(RevisionError::DiffNotFound.code(), "diffNotFound");
    }

    #[test]
    fn test_umbrella_code_passthrough() {
        let err = Error::from(SourceError::LocateComment);
        assert_eq!(err.code(), Some("locateComment"));
        let err = Error::from(MaskError::MarkerCollision);
        assert_eq!(err.code(), None);
    }
}
