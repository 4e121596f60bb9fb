//! Site configuration for Talkform.
//!
//! Every wiki renders timestamps, signatures, and indentation differently.
//! The engine crates never read ambient/global state; they take a
//! [`SiteConfig`] that has been loaded from a `talkform.toml` file (or built
//! in code) and injected at construction time.
//!
//! All fields have defaults matching an English-language wiki, so
//! `SiteConfig::default()` produces a usable configuration and a config file
//! only needs to name the fields it overrides.

use serde::Deserialize;
use std::path::Path;

/// Error loading or validating a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or type error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field value that cannot be used as configured.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Site configuration consumed by the engine.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SiteConfig {
    /// Indentation behavior for replies.
    pub indentation: IndentationConfig,
    /// Names of templates the engine inserts or recognizes.
    pub templates: TemplatesConfig,
    /// Signature recognition settings.
    pub signatures: SignatureConfig,
    /// Timestamp format settings used to build the timestamp pattern.
    pub timestamps: TimestampConfig,
    /// Extension tag names whose content must be hidden before any text
    /// transformation (in addition to the built-in `nowiki`/`pre`/`source`/
    /// `syntaxhighlight`).
    pub hidden_tags: Vec<String>,
}

impl SiteConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(digits) = &self.timestamps.digits {
            if digits.chars().count() != 10 {
                return Err(ConfigError::Invalid(format!(
                    "timestamps.digits must contain exactly 10 characters, got {}",
                    digits.chars().count()
                )));
            }
        }
        if self.timestamps.month_names.len() != 12 {
            return Err(ConfigError::Invalid(format!(
                "timestamps.month_names must contain 12 entries, got {}",
                self.timestamps.month_names.len()
            )));
        }
        if self.timestamps.month_abbreviations.len() != 12 {
            return Err(ConfigError::Invalid(format!(
                "timestamps.month_abbreviations must contain 12 entries, got {}",
                self.timestamps.month_abbreviations.len()
            )));
        }
        Ok(())
    }
}

/// How replies are indented relative to their parent comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndentationMode {
    /// Continue whatever indentation characters the parent uses.
    #[default]
    Mimic,
    /// Always reply with the default indentation character.
    Unify,
}

/// Indentation behavior for replies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndentationConfig {
    /// Character appended to a parent's indentation for a new reply when the
    /// parent's list is not numbered.
    pub default_char: char,
    /// Whether a space follows the indentation characters (`": text"` vs
    /// `":text"`).
    pub space_after: bool,
    /// Reply indentation mode.
    pub mode: IndentationMode,
}

impl Default for IndentationConfig {
    fn default() -> Self {
        Self {
            default_char: ':',
            space_after: true,
            mode: IndentationMode::Mimic,
        }
    }
}

/// Names of templates the engine inserts or recognizes.
///
/// Each list may be empty (the feature is then disabled); when a template is
/// inserted, the first name in its list is used.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Paragraph-break templates usable inside list items (`{{pb}}`).
    pub paragraph: Vec<String>,
    /// Block templates rendering their content in small font (`{{smalldiv}}`).
    pub small_div: Vec<String>,
    /// Outdent templates (`{{outdent}}`).
    pub outdent: Vec<String>,
    /// Templates marking unsigned comments; first positional parameter is the
    /// author, second (optional) the timestamp.
    pub unsigned: Vec<String>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            paragraph: vec![],
            small_div: vec![],
            outdent: vec!["outdent".to_owned(), "od".to_owned()],
            unsigned: vec![
                "unsigned".to_owned(),
                "unsignedIP".to_owned(),
                "unsigned2".to_owned(),
            ],
        }
    }
}

/// Signature recognition settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Pattern (anchored at the end of the text preceding an author link)
    /// matching decorative signature prefixes such as `-- `.
    pub prefix_pattern: String,
    /// Maximum number of characters scanned backward from a timestamp when
    /// looking for the author link.
    pub scan_limit: usize,
    /// Namespace aliases that user pages may be linked under.
    pub user_namespaces: Vec<String>,
    /// Title of the contributions special page (links IP authors).
    pub contributions_page: String,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            prefix_pattern: r"(?:[-–—―~]+|\s)\s*$".to_owned(),
            scan_limit: 100,
            user_namespaces: vec![
                "User".to_owned(),
                "User talk".to_owned(),
            ],
            contributions_page: "Special:Contributions".to_owned(),
        }
    }
}

/// Timestamp format settings.
///
/// `date_format` uses MediaWiki date format codes; the supported subset is
/// `xg j d D l F M n Y G H i`, backslash escapes, and literal text.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimestampConfig {
    /// Date format timestamps are rendered in.
    pub date_format: String,
    /// Local digit characters 0-9, when the wiki does not use ASCII digits.
    pub digits: Option<String>,
    /// Timezone abbreviations that may appear in parentheses after the date.
    pub timezone_abbreviations: Vec<String>,
    /// Offset of the wiki's display timezone from UTC, in minutes.
    pub utc_offset_minutes: i32,
    /// Full month names, January first.
    pub month_names: Vec<String>,
    /// Abbreviated month names, January first.
    pub month_abbreviations: Vec<String>,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            date_format: "H:i, j F Y".to_owned(),
            digits: None,
            timezone_abbreviations: vec!["UTC".to_owned()],
            utc_offset_minutes: 0,
            month_names: [
                "January",
                "February",
                "March",
                "April",
                "May",
                "June",
                "July",
                "August",
                "September",
                "October",
                "November",
                "December",
            ]
            .map(str::to_owned)
            .to_vec(),
            month_abbreviations: [
                "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov",
                "Dec",
            ]
            .map(str::to_owned)
            .to_vec(),
        }
    }
}
