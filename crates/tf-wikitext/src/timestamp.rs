//! Timestamp pattern construction and parsing.
//!
//! Wikis render signature timestamps in a site-configured date format
//! (MediaWiki format codes) and possibly with localized digits. The
//! [`TimestampParser`] compiles that configuration into one regular
//! expression matching a full rendered timestamp including the trailing
//! timezone parenthetical, and can turn a match back into an instant.

use chrono::{DateTime, FixedOffset, TimeZone as _, Utc};
use regex::{Captures, Regex};
use tf_config::SiteConfig;

use crate::error::SetupError;

/// Which date component a capture group holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateField {
    Year,
    MonthNumber,
    MonthName,
    MonthAbbreviation,
    Day,
    Hour,
    Minute,
}

/// Compiled timestamp pattern for one site configuration.
#[derive(Debug)]
pub struct TimestampParser {
    regex: Regex,
    fields: Vec<DateField>,
    month_names: Vec<String>,
    month_abbreviations: Vec<String>,
    digits: Option<Vec<char>>,
    utc_offset_minutes: i32,
}

impl TimestampParser {
    /// Compile the timestamp pattern from site configuration.
    ///
    /// Supported format codes: `xg j d D l F M n Y G H i`, backslash escapes,
    /// and literal text. Unknown codes are treated as literal characters.
    pub fn new(config: &SiteConfig) -> Result<Self, SetupError> {
        let ts = &config.timestamps;
        let digit = ts.digits.as_ref().map_or_else(
            || r"\d".to_owned(),
            |d| format!("[{}]", regex::escape(d)),
        );

        let mut pattern = String::new();
        let mut fields = Vec::new();
        let mut chars = ts.date_format.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                'x' if chars.peek() == Some(&'g') => {
                    chars.next();
                    pattern.push_str(&name_group(&ts.month_names));
                    fields.push(DateField::MonthName);
                }
                'j' => {
                    pattern.push_str(&format!("({digit}{{1,2}})"));
                    fields.push(DateField::Day);
                }
                'd' => {
                    pattern.push_str(&format!("({digit}{{2}})"));
                    fields.push(DateField::Day);
                }
                // Weekday names are display-only; match a word, capture
                // nothing.
                'D' | 'l' => pattern.push_str(r"(?:\S+)"),
                'F' => {
                    pattern.push_str(&name_group(&ts.month_names));
                    fields.push(DateField::MonthName);
                }
                'M' => {
                    pattern.push_str(&name_group(&ts.month_abbreviations));
                    fields.push(DateField::MonthAbbreviation);
                }
                'n' => {
                    pattern.push_str(&format!("({digit}{{1,2}})"));
                    fields.push(DateField::MonthNumber);
                }
                'Y' => {
                    pattern.push_str(&format!("({digit}{{4}})"));
                    fields.push(DateField::Year);
                }
                'G' => {
                    pattern.push_str(&format!("({digit}{{1,2}})"));
                    fields.push(DateField::Hour);
                }
                'H' => {
                    pattern.push_str(&format!("({digit}{{2}})"));
                    fields.push(DateField::Hour);
                }
                'i' => {
                    pattern.push_str(&format!("({digit}{{2}})"));
                    fields.push(DateField::Minute);
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        pattern.push_str(&regex::escape(&next.to_string()));
                    }
                }
                '"' => {
                    // Quoted literal text.
                    for q in chars.by_ref() {
                        if q == '"' {
                            break;
                        }
                        pattern.push_str(&regex::escape(&q.to_string()));
                    }
                }
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }

        if !ts.timezone_abbreviations.is_empty() {
            let zones: Vec<String> = ts
                .timezone_abbreviations
                .iter()
                .map(|z| regex::escape(z))
                .collect();
            pattern.push_str(&format!("[ \u{a0}]\\((?:{})\\)", zones.join("|")));
        }

        Ok(Self {
            regex: Regex::new(&pattern)?,
            fields,
            month_names: ts.month_names.clone(),
            month_abbreviations: ts.month_abbreviations.clone(),
            digits: ts.digits.as_ref().map(|d| d.chars().collect()),
            utc_offset_minutes: ts.utc_offset_minutes,
        })
    }

    /// The compiled timestamp pattern.
    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Parse a matched timestamp back into an instant.
    ///
    /// Returns `None` when the captured values do not form a valid date;
    /// callers keep the raw rendered string either way.
    #[must_use]
    pub fn parse_captures(&self, caps: &Captures<'_>) -> Option<DateTime<Utc>> {
        let mut year = None;
        let mut month = None;
        let mut day = None;
        let mut hour = None;
        let mut minute = None;

        for (i, field) in self.fields.iter().enumerate() {
            let text = caps.get(i + 1)?.as_str();
            match field {
                DateField::Year => year = self.parse_number(text),
                DateField::MonthNumber => month = self.parse_number(text),
                DateField::MonthName => month = name_index(&self.month_names, text),
                DateField::MonthAbbreviation => {
                    month = name_index(&self.month_abbreviations, text);
                }
                DateField::Day => day = self.parse_number(text),
                DateField::Hour => hour = self.parse_number(text),
                DateField::Minute => minute = self.parse_number(text),
            }
        }

        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)?;
        offset
            .with_ymd_and_hms(
                i32::try_from(year?).ok()?,
                month?,
                day?,
                hour?,
                minute?,
                0,
            )
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Parse the first timestamp in `text`.
    #[must_use]
    pub fn parse_first(&self, text: &str) -> Option<DateTime<Utc>> {
        let caps = self.regex.captures(text)?;
        self.parse_captures(&caps)
    }

    /// Parse a number, transliterating localized digits when configured.
    fn parse_number(&self, text: &str) -> Option<u32> {
        match &self.digits {
            None => text.parse().ok(),
            Some(digits) => {
                let mut value: u32 = 0;
                for c in text.chars() {
                    let d = digits.iter().position(|&d| d == c)?;
                    value = value.checked_mul(10)?.checked_add(u32::try_from(d).ok()?)?;
                }
                Some(value)
            }
        }
    }
}

/// Capture group matching any of the given names, longest first so that
/// prefixes (e.g. "Juni"/"Jun") do not shadow longer names.
fn name_group(names: &[String]) -> String {
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort_by_key(|n| std::cmp::Reverse(n.chars().count()));
    let alts: Vec<String> = sorted.iter().map(|n| regex::escape(n)).collect();
    format!("({})", alts.join("|"))
}

/// 1-based month for a matched month name.
fn name_index(names: &[String], text: &str) -> Option<u32> {
    names
        .iter()
        .position(|n| n == text)
        .and_then(|i| u32::try_from(i + 1).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Timelike as _};

    fn parser() -> TimestampParser {
        TimestampParser::new(&SiteConfig::default()).unwrap()
    }

    #[test]
    fn test_default_format_matches_standard_timestamp() {
        let p = parser();
        let text = "Some text 12:30, 25 January 2024 (UTC) more";
        let m = p.regex().find(text).unwrap();
        assert_eq!(m.as_str(), "12:30, 25 January 2024 (UTC)");
    }

    #[test]
    fn test_parse_roundtrip() {
        let p = parser();
        let date = p.parse_first("12:30, 25 January 2024 (UTC)").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 1, 25, 12, 30, 0).unwrap());
    }

    #[test]
    fn test_no_match_without_timezone() {
        let p = parser();
        assert!(p.regex().find("12:30, 25 January 2024").is_none());
    }

    #[test]
    fn test_invalid_date_parses_to_none() {
        let p = parser();
        assert!(p.parse_first("25:99, 45 January 2024 (UTC)").is_none());
    }

    #[test]
    fn test_alternative_format() {
        let mut config = SiteConfig::default();
        config.timestamps.date_format = "j M Y, H:i".to_owned();
        let p = TimestampParser::new(&config).unwrap();
        let date = p.parse_first("5 Mar 2023, 09:07 (UTC)").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2023, 3, 5, 9, 7, 0).unwrap());
    }

    #[test]
    fn test_utc_offset_applied() {
        let mut config = SiteConfig::default();
        config.timestamps.utc_offset_minutes = 120;
        let p = TimestampParser::new(&config).unwrap();
        let date = p.parse_first("12:00, 1 June 2024 (UTC)").unwrap();
        assert_eq!(date.hour(), 10);
    }

    #[test]
    fn test_localized_digits() {
        let mut config = SiteConfig::default();
        config.timestamps.digits = Some("۰۱۲۳۴۵۶۷۸۹".to_owned());
        let p = TimestampParser::new(&config).unwrap();
        let date = p.parse_first("۱۲:۳۰, ۲۵ January ۲۰۲۴ (UTC)").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 1, 25, 12, 30, 0).unwrap());
    }
}
