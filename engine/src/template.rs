//! Destination path templating.
//!
//! Templates are plain strings with `{token}` placeholders, optionally
//! followed by a format spec: `{month:02d}`, `{stem:>12}`, `{index:04}`.
//! Format specs follow the familiar `[[fill]align][sign][#][0][width][.precision][type]`
//! layout with types `s`, `d`, `f`/`F`, `x`/`X`, `o` and `b`. `{{` and `}}`
//! produce literal braces.
//!
//! Before parsing, unmatched braces are dropped (see [`clean_unmatched_braces`])
//! so that a half-typed template never fails on brace mismatch alone. A
//! placeholder naming a token that does not exist is always an error.
//!
//! # Example
//!
//! ```
//! use ditz_engine::template::Template;
//! use ditz_engine::tokens::{TokenSet, TokenValue};
//!
//! let mut tokens = TokenSet::new();
//! tokens.insert("type", "video");
//! tokens.insert("month", TokenValue::Int(3));
//!
//! let template: Template = "{type}/{month:02d}".parse().unwrap();
//! assert_eq!(template.render(&tokens).unwrap(), "video/03");
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{EngineError, Result};
use crate::model::{MediaFile, MediaType};
use crate::tokens::{resolve_tokens, TokenSet, TokenValue, BASE_TOKEN_KEYS};

pub const DEFAULT_FOLDER_TEMPLATE: &str = "{type}/{file_year}/{month:02d}";
pub const DEFAULT_OTHER_FOLDER_TEMPLATE: &str = "misc";
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{stem}-{file_day}-{file_month}-{file_year}{ext}";

/// Drop unmatched braces from `template`.
///
/// A `}` with no open `{` before it is removed. Then, while the string still
/// has more `{` than `}`, the last `{` is removed.
pub fn clean_unmatched_braces(template: &str) -> String {
    let mut depth = 0usize;
    let mut chars: Vec<char> = Vec::with_capacity(template.len());

    for c in template.chars() {
        match c {
            '{' => {
                depth += 1;
                chars.push(c);
            }
            '}' if depth > 0 => {
                depth -= 1;
                chars.push(c);
            }
            '}' => {}
            _ => chars.push(c),
        }
    }

    let opens = chars.iter().filter(|&&c| c == '{').count();
    let closes = chars.iter().filter(|&&c| c == '}').count();
    let mut excess = opens.saturating_sub(closes);
    let mut i = chars.len();
    while excess > 0 && i > 0 {
        i -= 1;
        if chars[i] == '{' {
            chars.remove(i);
            excess -= 1;
        }
    }

    chars.into_iter().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
    /// Pad between sign and digits
    AfterSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Minus,
    Plus,
    Space,
}

/// A parsed `:spec` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormatSpec {
    fill: Option<char>,
    align: Option<Align>,
    sign: Option<Sign>,
    alternate: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    fn parse(spec: &str) -> std::result::Result<Self, String> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = FormatSpec::default();
        let mut i = 0;

        let align_of = |c: char| match c {
            '<' => Some(Align::Left),
            '>' => Some(Align::Right),
            '^' => Some(Align::Center),
            '=' => Some(Align::AfterSign),
            _ => None,
        };

        if chars.len() >= 2 && align_of(chars[1]).is_some() {
            out.fill = Some(chars[0]);
            out.align = align_of(chars[1]);
            i = 2;
        } else if let Some(align) = chars.first().and_then(|&c| align_of(c)) {
            out.align = Some(align);
            i = 1;
        }

        match chars.get(i) {
            Some('+') => out.sign = Some(Sign::Plus),
            Some('-') => out.sign = Some(Sign::Minus),
            Some(' ') => out.sign = Some(Sign::Space),
            _ => {}
        }
        if out.sign.is_some() {
            i += 1;
        }

        if chars.get(i) == Some(&'#') {
            out.alternate = true;
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            out.zero = true;
            i += 1;
        }

        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i > start {
            let digits: String = chars[start..i].iter().collect();
            out.width = Some(digits.parse().map_err(|_| format!("width '{}' too large", digits))?);
        }

        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            if i == start {
                return Err("missing precision after '.'".to_string());
            }
            let digits: String = chars[start..i].iter().collect();
            out.precision =
                Some(digits.parse().map_err(|_| format!("precision '{}' too large", digits))?);
        }

        if let Some(&c) = chars.get(i) {
            if !"sdfFxXob".contains(c) {
                return Err(format!("unknown format type '{}'", c));
            }
            out.kind = Some(c);
            i += 1;
        }

        if i != chars.len() {
            return Err(format!("invalid format spec '{}'", spec));
        }
        Ok(out)
    }

    /// Format `value` according to this spec.
    fn apply(&self, value: &TokenValue) -> std::result::Result<String, String> {
        let (prefix, body, numeric) = match value {
            TokenValue::Str(s) => {
                if !matches!(self.kind, None | Some('s')) {
                    return Err(format!("format type '{}' needs a number", self.kind.unwrap_or('s')));
                }
                if self.sign.is_some() || self.alternate {
                    return Err("sign not allowed for text".to_string());
                }
                let body = match self.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s.clone(),
                };
                (String::new(), body, false)
            }
            TokenValue::Int(i) => {
                let (negative, magnitude) = (*i < 0, i.unsigned_abs());
                let (radix_prefix, digits) = match self.kind {
                    None | Some('d') => ("", magnitude.to_string()),
                    Some('x') => ("0x", format!("{:x}", magnitude)),
                    Some('X') => ("0X", format!("{:X}", magnitude)),
                    Some('o') => ("0o", format!("{:o}", magnitude)),
                    Some('b') => ("0b", format!("{:b}", magnitude)),
                    Some('f') | Some('F') => {
                        let p = self.precision.unwrap_or(6);
                        ("", format!("{:.*}", p, magnitude as f64))
                    }
                    Some(c) => return Err(format!("format type '{}' not valid for an integer", c)),
                };
                let mut prefix = self.sign_prefix(negative);
                if self.alternate {
                    prefix.push_str(radix_prefix);
                }
                (prefix, digits, true)
            }
            TokenValue::Float(x) => {
                let negative = x.is_sign_negative() && *x != 0.0;
                let magnitude = x.abs();
                let digits = match (self.kind, self.precision) {
                    (Some('f') | Some('F'), p) => format!("{:.*}", p.unwrap_or(6), magnitude),
                    (None, Some(p)) => format!("{:.*}", p, magnitude),
                    (None, None) => TokenValue::Float(magnitude).to_string(),
                    (Some(c), _) => return Err(format!("format type '{}' not valid for a float", c)),
                };
                (self.sign_prefix(negative), digits, true)
            }
        };

        let len = prefix.chars().count() + body.chars().count();
        let width = self.width.unwrap_or(0);
        if len >= width {
            return Ok(format!("{}{}", prefix, body));
        }
        let pad = width - len;

        let (fill, align) = match (self.fill, self.align, self.zero) {
            (fill, Some(align), _) => (fill.unwrap_or(' '), align),
            (_, None, true) if numeric => ('0', Align::AfterSign),
            (_, None, true) => ('0', Align::Left),
            (_, None, false) if numeric => (' ', Align::Right),
            (_, None, false) => (' ', Align::Left),
        };
        let padding = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();

        Ok(match align {
            Align::Left => format!("{}{}{}", prefix, body, padding(pad)),
            Align::Right => format!("{}{}{}", padding(pad), prefix, body),
            Align::Center => {
                let left = pad / 2;
                format!("{}{}{}{}", padding(left), prefix, body, padding(pad - left))
            }
            Align::AfterSign => format!("{}{}{}", prefix, padding(pad), body),
        })
    }

    fn sign_prefix(&self, negative: bool) -> String {
        match (negative, self.sign) {
            (true, _) => "-".to_string(),
            (false, Some(Sign::Plus)) => "+".to_string(),
            (false, Some(Sign::Space)) => " ".to_string(),
            (false, _) => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder { name: String, spec: FormatSpec },
}

/// A template parsed into literal segments and placeholders.
///
/// Constructed via [`FromStr`], which sanitizes unmatched braces before
/// parsing. Use [`Template::parse_strict`] to parse without sanitizing.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl FromStr for Template {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_strict(&clean_unmatched_braces(s))
    }
}

impl Template {
    /// Parse `s` as-is. Unmatched braces are errors here.
    pub fn parse_strict(s: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = s.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(EngineError::template(s, "single '}' encountered")),
                '{' => {
                    let mut field = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => {
                                return Err(EngineError::template(s, "nested '{' in placeholder"))
                            }
                            _ => field.push(c),
                        }
                    }
                    if !closed {
                        return Err(EngineError::template(s, "unclosed '{'"));
                    }

                    let (name, spec) = match field.split_once(':') {
                        Some((name, spec)) => (name, spec),
                        None => (field.as_str(), ""),
                    };
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(EngineError::template(s, "empty placeholder"));
                    }
                    let spec = FormatSpec::parse(spec).map_err(|reason| {
                        EngineError::template(s, format!("token '{}': {}", name, reason))
                    })?;

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder {
                        name: name.to_string(),
                        spec,
                    });
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Template {
            source: s.to_string(),
            segments,
        })
    }

    /// The (sanitized) source text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Token names referenced by this template, in order of first use.
    pub fn tokens(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder { name, .. } if seen.insert(name.as_str()) => {
                    Some(name.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Expand every placeholder against `tokens`.
    ///
    /// # Errors
    /// Returns a template error naming the first unknown token, or a token
    /// whose value cannot take the placeholder's format spec.
    pub fn render(&self, tokens: &TokenSet) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { name, spec } => {
                    let value = tokens.get(name).ok_or_else(|| {
                        EngineError::template(&self.source, format!("unknown token '{}'", name))
                    })?;
                    let formatted = spec.apply(value).map_err(|reason| {
                        EngineError::template(&self.source, format!("token '{}': {}", name, reason))
                    })?;
                    out.push_str(&formatted);
                }
            }
        }
        Ok(out)
    }
}

/// Token names referenced by `template` after brace sanitizing.
pub fn referenced_tokens(template: &str) -> Result<Vec<String>> {
    let template: Template = template.parse()?;
    Ok(template.tokens().into_iter().map(str::to_string).collect())
}

/// Folder templates per media type plus the shared filename template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSet {
    pub folder_templates: BTreeMap<MediaType, String>,
    pub filename_template: String,
}

impl Default for TemplateSet {
    fn default() -> Self {
        let mut folder_templates = BTreeMap::new();
        for media_type in MediaType::SCANNED {
            folder_templates.insert(media_type, DEFAULT_FOLDER_TEMPLATE.to_string());
        }
        folder_templates.insert(MediaType::Other, DEFAULT_OTHER_FOLDER_TEMPLATE.to_string());
        TemplateSet {
            folder_templates,
            filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
        }
    }
}

impl TemplateSet {
    pub fn with_folder_template(mut self, media_type: MediaType, template: impl Into<String>) -> Self {
        self.folder_templates.insert(media_type, template.into());
        self
    }

    pub fn with_filename_template(mut self, template: impl Into<String>) -> Self {
        self.filename_template = template.into();
        self
    }

    /// Folder template for `media_type`, falling back to `misc`.
    pub fn folder_template_for(&self, media_type: MediaType) -> &str {
        self.folder_templates
            .get(&media_type)
            .map(String::as_str)
            .unwrap_or(DEFAULT_OTHER_FOLDER_TEMPLATE)
    }

    /// Referenced tokens that are not part of the base set.
    ///
    /// These are the values a caller has to supply as custom tokens.
    pub fn custom_token_names(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let templates = self
            .folder_templates
            .values()
            .chain(std::iter::once(&self.filename_template));
        for template in templates {
            for name in referenced_tokens(template)? {
                if !BASE_TOKEN_KEYS.contains(&name.as_str()) {
                    names.insert(name);
                }
            }
        }
        Ok(names)
    }
}

/// Render the destination path of `file` under `root`.
///
/// The result is `root / folder / filename`. Leading separators in the
/// rendered folder are stripped so the path stays under `root`.
#[instrument(level = "debug", skip_all, fields(file = %file.path.display(), index = index))]
pub fn render_destination(
    root: &Path,
    file: &MediaFile,
    index: u64,
    templates: &TemplateSet,
    custom_tokens: &TokenSet,
) -> Result<PathBuf> {
    let tokens = resolve_tokens(file, index, custom_tokens);

    let folder_template: Template = templates.folder_template_for(file.media_type).parse()?;
    let filename_template: Template = templates.filename_template.parse()?;

    let folder = folder_template.render(&tokens)?;
    let filename = filename_template.render(&tokens)?;
    if filename.trim().is_empty() {
        return Err(EngineError::template(
            filename_template.as_str(),
            "filename rendered empty",
        ));
    }

    let folder = folder.trim_start_matches(['/', '\\']);
    Ok(root.join(folder).join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::{Local, TimeZone};
    use std::time::SystemTime;

    fn clip() -> MediaFile {
        let local = Local
            .with_ymd_and_hms(2024, 3, 5, 12, 0, 0)
            .single()
            .expect("valid local time");
        MediaFile {
            path: PathBuf::from("/card/DCIM/clip.mp4"),
            extension: ".mp4".to_string(),
            media_type: MediaType::Video,
            size: 1,
            modified: SystemTime::from(local),
        }
    }

    fn tokens() -> TokenSet {
        [
            ("stem", TokenValue::from("clip")),
            ("year", TokenValue::Int(2024)),
            ("month", TokenValue::Int(3)),
            ("rate", TokenValue::Float(2.5)),
            ("delta", TokenValue::Int(-7)),
        ]
        .into_iter()
        .collect()
    }

    fn render(template: &str) -> Result<String> {
        template.parse::<Template>()?.render(&tokens())
    }

    #[test]
    fn test_clean_unmatched_braces() {
        assert_eq!(clean_unmatched_braces("{stem}-{year"), "{stem}-year");
        assert_eq!(clean_unmatched_braces("stem}-{year}"), "stem-{year}");
        assert_eq!(clean_unmatched_braces("}}{a}{{"), "{a}");
        assert_eq!(clean_unmatched_braces("{a}/{b}"), "{a}/{b}");
        assert_eq!(clean_unmatched_braces(""), "");
    }

    #[test]
    fn test_malformed_templates_render() {
        assert_eq!(render("{stem}-{year").unwrap(), "clip-year");
        assert_eq!(render("stem}-{year}").unwrap(), "stem-2024");
    }

    #[test]
    fn test_format_specs() {
        assert_eq!(render("{month:02d}").unwrap(), "03");
        assert_eq!(render("{month:02}").unwrap(), "03");
        assert_eq!(render("{month:>4}").unwrap(), "   3");
        assert_eq!(render("{month:<4}|").unwrap(), "3   |");
        assert_eq!(render("{month:*^5}").unwrap(), "**3**");
        assert_eq!(render("{delta:04d}").unwrap(), "-007");
        assert_eq!(render("{month:+d}").unwrap(), "+3");
        assert_eq!(render("{year:x}").unwrap(), "7e8");
        assert_eq!(render("{year:#X}").unwrap(), "0X7E8");
        assert_eq!(render("{rate:.2f}").unwrap(), "2.50");
        assert_eq!(render("{rate:06.1f}").unwrap(), "0002.5");
        assert_eq!(render("{stem:>6}").unwrap(), "  clip");
        assert_eq!(render("{stem:.2}").unwrap(), "cl");
        assert_eq!(render("{{{stem}}}").unwrap(), "{clip}");
    }

    #[test]
    fn test_spec_type_mismatch_is_template_error() {
        let err = render("{stem:d}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Template);
        let err = render("{rate:d}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Template);
        assert!(render("{month:q}").is_err());
    }

    #[test]
    fn test_unknown_token_names_the_token() {
        let err = render("{nonexistent_token}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Template);
        assert!(err.to_string().contains("nonexistent_token"));
    }

    #[test]
    fn test_empty_placeholder_is_error() {
        assert!(render("a{}b").is_err());
    }

    #[test]
    fn test_referenced_tokens() {
        let names = referenced_tokens("{project}/{type}/{project}-{reel:03d").unwrap();
        assert_eq!(names, vec!["project", "type"]);
    }

    #[test]
    fn test_custom_token_names() {
        let set = TemplateSet::default()
            .with_folder_template(MediaType::Video, "{project}/{type}")
            .with_filename_template("{camera}_{index:04d}{ext}");
        let names: Vec<String> = set.custom_token_names().unwrap().into_iter().collect();
        assert_eq!(names, vec!["camera", "project"]);
    }

    #[test]
    fn test_render_destination_scenario() {
        let templates = TemplateSet::default();
        let path = render_destination(
            Path::new("/target"),
            &clip(),
            1,
            &templates,
            &TokenSet::new(),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/target/video/2024/03/clip-5-3-2024.mp4"));
    }

    #[test]
    fn test_render_destination_is_idempotent() {
        let templates = TemplateSet::default().with_filename_template("{index:03d}_{stem}{ext}");
        let custom = TokenSet::new();
        let a = render_destination(Path::new("/t"), &clip(), 4, &templates, &custom).unwrap();
        let b = render_destination(Path::new("/t"), &clip(), 4, &templates, &custom).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/t/video/2024/03/004_clip.mp4"));
    }

    #[test]
    fn test_other_type_uses_misc() {
        let mut file = clip();
        file.media_type = MediaType::Other;
        let templates = TemplateSet::default().with_filename_template("{stem}{ext}");
        let path =
            render_destination(Path::new("/t"), &file, 1, &templates, &TokenSet::new()).unwrap();
        assert_eq!(path, PathBuf::from("/t/misc/clip.mp4"));
    }

    #[test]
    fn test_absolute_folder_stays_under_root() {
        let templates = TemplateSet::default()
            .with_folder_template(MediaType::Video, "/{type}")
            .with_filename_template("{stem}{ext}");
        let path =
            render_destination(Path::new("/t"), &clip(), 1, &templates, &TokenSet::new()).unwrap();
        assert_eq!(path, PathBuf::from("/t/video/clip.mp4"));
    }
}
