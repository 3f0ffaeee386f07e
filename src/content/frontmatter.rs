//! Front-matter parsing

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Header delimiter line
const DELIMITER: &str = "---";

/// Keys the parser interprets; everything else lands in `extra`
pub const RECOGNIZED_KEYS: [&str; 5] = ["title", "date", "categories", "tags", "image"];

/// A front-matter problem, located by line within the source file
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: {message}")]
pub struct MetadataError {
    pub line: usize,
    pub message: String,
}

impl MetadataError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Custom deserializer that handles both a single string and a list of strings
fn string_or_set<'de, D>(deserializer: D) -> Result<IndexSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, SeqAccess, Visitor};
    use std::fmt;

    struct StringOrSet;

    impl<'de> Visitor<'de> for StringOrSet {
        type Value = IndexSet<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(normalize([value.to_string()]))
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                items.push(item);
            }
            Ok(normalize(items))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(IndexSet::new())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(IndexSet::new())
        }
    }

    deserializer.deserialize_any(StringOrSet)
}

/// Trim, drop empties, keep first occurrence
fn normalize<I: IntoIterator<Item = String>>(items: I) -> IndexSet<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Header as written, before required keys are checked
#[derive(Debug, Deserialize)]
struct RawFrontMatter {
    title: Option<String>,
    date: Option<String>,
    #[serde(default, deserialize_with = "string_or_set")]
    categories: IndexSet<String>,
    #[serde(default, deserialize_with = "string_or_set")]
    tags: IndexSet<String>,
    image: Option<String>,
    #[serde(flatten)]
    extra: IndexMap<String, serde_yaml::Value>,
}

/// Front-matter data from a post file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontMatter {
    pub title: String,
    /// Date as written; see [`FrontMatter::publish_date`]
    pub date: String,
    #[serde(skip_serializing_if = "IndexSet::is_empty")]
    pub categories: IndexSet<String>,
    #[serde(skip_serializing_if = "IndexSet::is_empty")]
    pub tags: IndexSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Unrecognized keys, in source order
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_yaml::Value>,
}

impl FrontMatter {
    /// Parse front-matter from content string
    /// Returns (front_matter, remaining_content)
    pub fn parse(content: &str) -> Result<(Self, &str), MetadataError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut lines = content.split_inclusive('\n');

        match lines.next() {
            Some(first) if first.trim_end() == DELIMITER => {}
            _ => {
                return Err(MetadataError::new(
                    1,
                    "missing front matter: expected '---' on the first line",
                ))
            }
        }

        let header_start = content.find('\n').map(|i| i + 1).unwrap_or(content.len());
        let mut offset = header_start;

        for line in lines {
            if line.trim_end() == DELIMITER {
                let header = &content[header_start..offset];
                let body = &content[offset + line.len()..];
                return Ok((Self::from_header(header)?, body));
            }
            offset += line.len();
        }

        Err(MetadataError::new(
            1,
            "unterminated front matter: closing '---' not found",
        ))
    }

    /// Line number (1-based) on which `body` starts within `content`.
    /// `body` must be the slice returned by [`FrontMatter::parse`].
    pub fn body_line(content: &str, body: &str) -> usize {
        let consumed = content.len().saturating_sub(body.len());
        content[..consumed].matches('\n').count() + 1
    }

    fn from_header(header: &str) -> Result<Self, MetadataError> {
        // The header's first line is line 2 of the file.
        let key_line = |key: &str| {
            header
                .lines()
                .position(|l| {
                    l.strip_prefix(key)
                        .is_some_and(|rest| rest.trim_start().starts_with(':'))
                })
                .map(|i| i + 2)
                .unwrap_or(1)
        };

        if header.trim().is_empty() {
            return Err(MetadataError::new(1, "missing required key `title`"));
        }
        let raw: RawFrontMatter = serde_yaml::from_str(header).map_err(|e| {
            let line = e.location().map(|l| l.line() + 1).unwrap_or(1);
            MetadataError::new(line, e.to_string())
        })?;

        let title = match raw.title {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(MetadataError::new(key_line("title"), "missing required key `title`")),
        };
        let date = raw
            .date
            .ok_or_else(|| MetadataError::new(1, "missing required key `date`"))?;
        if parse_date_string(&date).is_none() {
            return Err(MetadataError::new(
                key_line("date"),
                format!("unrecognized date '{}'", date),
            ));
        }

        Ok(Self {
            title,
            date,
            categories: raw.categories,
            tags: raw.tags,
            image: raw.image.filter(|s| !s.trim().is_empty()),
            extra: raw.extra,
        })
    }

    /// Serialize back into a delimited header, ready to prepend to a body
    pub fn to_header(&self) -> Result<String, serde_yaml::Error> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n"))
    }

    /// Publish date; naive dates are placed in `tz`
    pub fn publish_date(&self, tz: &Tz) -> Option<DateTime<FixedOffset>> {
        match parse_date_string(&self.date)? {
            WrittenDate::Fixed(dt) => Some(dt),
            WrittenDate::Naive(naive) => {
                // A time inside a DST gap is read as UTC rather than rejected.
                let dt = tz
                    .from_local_datetime(&naive)
                    .earliest()
                    .unwrap_or_else(|| tz.from_utc_datetime(&naive));
                Some(dt.fixed_offset())
            }
        }
    }

    /// Opaque list-valued extra key, e.g. `related`
    pub fn extra_strings(&self, key: &str) -> Vec<String> {
        match self.extra.get(key) {
            Some(serde_yaml::Value::String(s)) => vec![s.clone()],
            Some(serde_yaml::Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A date as written in front matter, with or without an offset
enum WrittenDate {
    Fixed(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

/// Parse a date string in various formats
fn parse_date_string(s: &str) -> Option<WrittenDate> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(WrittenDate::Fixed(dt));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S %z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(WrittenDate::Fixed(dt));
        }
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    for fmt in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(WrittenDate::Naive(dt));
        }
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(WrittenDate::Naive);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = r#"---
title: On Column Tetris
date: 2024-01-15 10:30:00
categories: Databases
tags:
  - postgres
  - storage
  - postgres
image: cover.png
series: internals
---

Body starts here.
"#;

    #[test]
    fn test_parse_recognized_keys() {
        let (fm, body) = FrontMatter::parse(POST).unwrap();
        assert_eq!(fm.title, "On Column Tetris");
        assert_eq!(fm.date, "2024-01-15 10:30:00");
        assert_eq!(fm.categories.iter().collect::<Vec<_>>(), vec!["Databases"]);
        assert_eq!(fm.tags.iter().collect::<Vec<_>>(), vec!["postgres", "storage"]);
        assert_eq!(fm.image.as_deref(), Some("cover.png"));
        assert_eq!(body, "\nBody starts here.\n");
        assert_eq!(FrontMatter::body_line(POST, body), 12);
    }

    #[test]
    fn test_unrecognized_keys_preserved() {
        let (fm, _) = FrontMatter::parse(POST).unwrap();
        assert_eq!(
            fm.extra.get("series"),
            Some(&serde_yaml::Value::String("internals".into()))
        );
        assert!(RECOGNIZED_KEYS.iter().all(|k| !fm.extra.contains_key(*k)));
    }

    #[test]
    fn test_round_trip() {
        let (fm, _) = FrontMatter::parse(POST).unwrap();
        let header = fm.to_header().unwrap();
        let reparsed = format!("{}body\n", header);
        let (again, body) = FrontMatter::parse(&reparsed).unwrap();
        assert_eq!(again, fm);
        assert_eq!(body, "body\n");
    }

    #[test]
    fn test_unterminated_header() {
        let err = FrontMatter::parse("---\ntitle: x\ndate: 2024-01-01\n\nno end").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_missing_header() {
        let err = FrontMatter::parse("# Just markdown\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_missing_required_keys() {
        let err = FrontMatter::parse("---\ntitle: x\n---\nbody").unwrap_err();
        assert!(err.message.contains("`date`"));

        let err = FrontMatter::parse("---\ndate: 2024-01-01\n---\nbody").unwrap_err();
        assert!(err.message.contains("`title`"));

        let err = FrontMatter::parse("---\n---\nbody").unwrap_err();
        assert!(err.message.contains("`title`"));
    }

    #[test]
    fn test_bad_date_reports_its_line() {
        let err = FrontMatter::parse("---\ntitle: x\ndate: someday\n---\n").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_crlf_and_bom() {
        let content = "\u{feff}---\r\ntitle: x\r\ndate: 2024-01-01\r\n---\r\nbody\r\n";
        let (fm, body) = FrontMatter::parse(content).unwrap();
        assert_eq!(fm.title, "x");
        assert_eq!(body, "body\r\n");
    }

    #[test]
    fn test_publish_date_in_timezone() {
        let (fm, _) = FrontMatter::parse(POST).unwrap();
        let dt = fm.publish_date(&chrono_tz::America::Sao_Paulo).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-15T10:30:00-03:00");

        let fm = FrontMatter {
            date: "2024-01-15T10:30:00+02:00".into(),
            ..fm
        };
        let dt = fm.publish_date(&chrono_tz::UTC).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn test_related_extra_strings() {
        let (fm, _) =
            FrontMatter::parse("---\ntitle: x\ndate: 2024-01-01\nrelated: [a, b]\n---\n").unwrap();
        assert_eq!(fm.extra_strings("related"), vec!["a", "b"]);
        assert!(fm.extra_strings("missing").is_empty());
    }
}
