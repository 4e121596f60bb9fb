//! Comment and section descriptor types for Talkform.
//!
//! These are the engine's view of a parsed talk page: a DOM parser (out of
//! scope for this workspace) flattens each rendered comment into a
//! [`CommentDescriptor`] and hands it to the locator, which binds it to a
//! position in the page's wikitext.
//!
//! Enable the `serde` feature to derive `Serialize`/`Deserialize` on all
//! types, e.g. for shipping descriptors across a worker boundary.

use chrono::{DateTime, Utc};

/// Reference to the section a comment belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SectionRef {
    /// Headline text, markup stripped.
    pub headline: String,
    /// Headlines of ancestor sections, outermost first.
    pub ancestors: Vec<String>,
}

/// Identity of a comment preceding another comment, used as locator context.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreviousComment {
    /// Author user name.
    pub author: String,
    /// Rendered timestamp.
    pub timestamp: String,
}

/// A rendered comment as flattened by the DOM parser.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommentDescriptor {
    /// Author user name.
    pub author: String,
    /// Timestamp in the wiki's configured display format.
    pub timestamp: String,
    /// Parsed timestamp instant; `None` for unsigned comments.
    pub date: Option<DateTime<Utc>>,
    /// Flattened visible text with the signature stripped.
    pub text: String,
    /// Ordinal among the comments of the scope the searched code covers:
    /// the whole page, or the section when locating in section context.
    pub index: usize,
    /// Nesting level in the rendered thread (0 = top-level).
    pub level: usize,
    /// Whether the comment is unsigned (recovered from an unsigned template).
    pub is_unsigned: bool,
    /// Whether the comment is the first content after its section heading.
    pub follows_heading: bool,
    /// Section the comment belongs to, if any.
    pub section: Option<SectionRef>,
    /// Up to two comments immediately preceding this one in the thread.
    pub previous_comments: Vec<PreviousComment>,
}

impl CommentDescriptor {
    /// Create a descriptor with only the fields every comment has; the rest
    /// start empty/false and can be filled in by the parser.
    #[must_use]
    pub fn new(author: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            timestamp: timestamp.into(),
            date: None,
            text: String::new(),
            index: 0,
            level: 0,
            is_unsigned: false,
            follows_heading: false,
            section: None,
            previous_comments: vec![],
        }
    }

    /// Headline of the comment's section, if it has one.
    #[must_use]
    pub fn section_headline(&self) -> Option<&str> {
        self.section.as_ref().map(|s| s.headline.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_fills_identity_only() {
        let comment = CommentDescriptor::new("Alice", "12:00, 1 January 2024 (UTC)");
        assert_eq!(comment.author, "Alice");
        assert_eq!(comment.timestamp, "12:00, 1 January 2024 (UTC)");
        assert_eq!(comment.index, 0);
        assert!(comment.section.is_none());
        assert!(!comment.is_unsigned);
    }

    #[test]
    fn test_section_headline() {
        let mut comment = CommentDescriptor::new("Alice", "ts");
        assert_eq!(comment.section_headline(), None);
        comment.section = Some(SectionRef {
            headline: "Proposal".to_owned(),
            ancestors: vec![],
        });
        assert_eq!(comment.section_headline(), Some("Proposal"));
    }
}
