//! Token resolution.
//!
//! A [`TokenSet`] maps placeholder names to values. The base set is derived
//! from a [`MediaFile`]'s name and modification time; caller-supplied custom
//! tokens are overlaid on top and win on key collision.
//!
//! | Token        | Type    | Value                                        |
//! |--------------|---------|----------------------------------------------|
//! | `type`       | string  | `video`, `audio`, `photo` or `other`         |
//! | `file_date`  | float   | Raw modification time, seconds since epoch   |
//! | `file_year`  | integer | Local year of the modification time          |
//! | `file_month` | integer | Local month (1-12)                           |
//! | `file_day`   | integer | Local day of month                           |
//! | `year`, `month`, `day` | integer | Aliases of the three above         |
//! | `stem`       | string  | File name without extension                  |
//! | `ext`        | string  | Extension including the dot                  |
//! | `parent`     | string  | Name of the containing directory             |
//! | `index`      | integer | 1-based running counter across the job       |

use std::collections::BTreeMap;
use std::fmt;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Datelike, Local};
use serde::{Deserialize, Serialize};

use crate::model::MediaFile;

/// Names of every token in the base set.
pub const BASE_TOKEN_KEYS: &[&str] = &[
    "type",
    "file_date",
    "file_year",
    "file_month",
    "file_day",
    "year",
    "month",
    "day",
    "stem",
    "ext",
    "parent",
    "index",
];

/// A resolved token value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl TokenValue {
    /// Parse a user-typed literal: integer, then float, otherwise string.
    ///
    /// Only plain decimal numbers (`-12`, `2.5`) become numeric, and only
    /// when they display back exactly as typed. `007`, `1e3` or `nan` stay
    /// strings so a rendered label keeps its original text.
    pub fn parse_literal(s: &str) -> Self {
        let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
        let plain_decimal = !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
            && digits.matches('.').count() <= 1;
        if !plain_decimal {
            return TokenValue::Str(s.to_string());
        }

        let parsed = if digits.contains('.') {
            s.parse::<f64>().ok().map(TokenValue::Float)
        } else {
            s.parse::<i64>().ok().map(TokenValue::Int)
        };
        match parsed {
            Some(value) if value.to_string() == s => value,
            _ => TokenValue::Str(s.to_string()),
        }
    }
}

impl fmt::Display for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenValue::Int(i) => write!(f, "{}", i),
            // Whole floats keep a trailing ".0" so raw timestamps read as floats.
            TokenValue::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            TokenValue::Float(x) => write!(f, "{}", x),
            TokenValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TokenValue {
    fn from(s: &str) -> Self {
        TokenValue::Str(s.to_string())
    }
}

impl From<String> for TokenValue {
    fn from(s: String) -> Self {
        TokenValue::Str(s)
    }
}

impl From<i64> for TokenValue {
    fn from(i: i64) -> Self {
        TokenValue::Int(i)
    }
}

impl From<f64> for TokenValue {
    fn from(x: f64) -> Self {
        TokenValue::Float(x)
    }
}

/// Mapping from token name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSet(BTreeMap<String, TokenValue>);

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&TokenValue> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TokenValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TokenValue)> {
        self.0.iter()
    }

    /// Copy every entry of `other` into `self`, replacing existing keys.
    pub fn overlay(&mut self, other: &TokenSet) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl<K: Into<String>, V: Into<TokenValue>> FromIterator<(K, V)> for TokenSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TokenSet(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Derive the base token set for `file`.
pub fn base_tokens(file: &MediaFile, index: u64) -> TokenSet {
    let local: DateTime<Local> = file.modified.into();
    let raw_mtime = match file.modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    };

    let stem = file
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = file
        .path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let year = i64::from(local.year());
    let month = i64::from(local.month());
    let day = i64::from(local.day());

    let mut tokens = TokenSet::new();
    tokens.insert("type", file.media_type.as_str());
    tokens.insert("file_date", raw_mtime);
    tokens.insert("file_year", year);
    tokens.insert("file_month", month);
    tokens.insert("file_day", day);
    tokens.insert("year", year);
    tokens.insert("month", month);
    tokens.insert("day", day);
    tokens.insert("stem", stem);
    tokens.insert("ext", file.extension.clone());
    tokens.insert("parent", parent);
    tokens.insert("index", index as i64);
    tokens
}

/// Base tokens for `file` with `custom` overlaid.
pub fn resolve_tokens(file: &MediaFile, index: u64, custom: &TokenSet) -> TokenSet {
    let mut tokens = base_tokens(file, index);
    tokens.overlay(custom);
    tokens
}
