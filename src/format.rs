//! Deterministic filename formatting from template, metadata, and settings.
//!
//! Everything here is pure: the same (template, settings, metadata) tuple
//! always yields the same filename.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::settings::Settings;
use crate::util::{compile_static_regex, media_name};

// Strips the datetime placeholder plus at most one adjacent separator on
// each side, so disabling datetime leaves no stray '-'/'_' behind.
static DATETIME_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"[_-]?\{datetime\}[_-]?"));

/// Inputs for one filename. Mirrors the download request minus the batch
/// flag, which has no bearing on the name.
#[derive(Debug, Clone, Default)]
pub struct FilenameParams<'a> {
    /// Resource URL; supplies the fallback basename.
    pub url: &'a str,
    /// Posting username.
    pub username: Option<&'a str>,
    /// Capture time.
    pub datetime: Option<DateTime<Utc>>,
    /// Media file id (index suffix already applied by the caller).
    pub file_id: Option<&'a str>,
    /// Profile-level names are exempt from id hashing.
    pub profile: bool,
}

/// 32-bit polynomial rolling hash over UTF-16 code units
/// (`h = h*31 + unit`, wrapping). Pure; renders as an unsigned decimal.
#[must_use]
pub fn hash32(input: &str) -> u32 {
    let mut hash: u32 = 0;
    for unit in input.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(unit));
    }
    hash
}

/// Renders a datetime with dayjs-style pattern tokens
/// (`YYYY MM DD HH hh mm ss`). Unknown characters pass through verbatim.
///
/// `hh` renders the 24-hour field: the stock patterns use it for
/// wall-clock-style names, and midnight must read `00`.
#[must_use]
pub fn render_datetime(datetime: &DateTime<Utc>, pattern: &str) -> String {
    let mut strftime = String::with_capacity(pattern.len() + 8);
    let mut rest = pattern;
    while !rest.is_empty() {
        let (token, advance) = if rest.starts_with("YYYY") {
            ("%Y", 4)
        } else if rest.starts_with("MM") {
            ("%m", 2)
        } else if rest.starts_with("DD") {
            ("%d", 2)
        } else if rest.starts_with("HH") || rest.starts_with("hh") {
            ("%H", 2)
        } else if rest.starts_with("mm") {
            ("%M", 2)
        } else if rest.starts_with("ss") {
            ("%S", 2)
        } else {
            let ch = rest.chars().next().unwrap_or_default();
            if ch == '%' {
                strftime.push_str("%%");
            } else {
                strftime.push(ch);
            }
            rest = &rest[ch.len_utf8()..];
            continue;
        };
        strftime.push_str(token);
        rest = &rest[advance..];
    }
    datetime.format(&strftime).to_string()
}

/// Applies the media-index policy to a file id before formatting.
///
/// With indexing on, carousel siblings get `_{index+1}` appended; with it
/// off, the id is replaced by the URL basename so siblings of the same post
/// cannot collide on the API-provided post id.
#[must_use]
pub fn apply_media_index(
    file_id: Option<String>,
    media_index: Option<usize>,
    use_indexing: bool,
    url: &str,
) -> Option<String> {
    let Some(index) = media_index else {
        return file_id;
    };
    if use_indexing {
        file_id.map(|id| format!("{id}_{}", index + 1))
    } else {
        Some(media_name(url))
    }
}

/// Formats the filename (without extension) for one resource.
///
/// With the full username/datetime/id triple the template drives the name;
/// otherwise the file id stands alone, and with nothing at all the URL
/// basename is the name.
#[must_use]
pub fn format_filename(params: &FilenameParams<'_>, settings: &Settings) -> String {
    let file_id = match params.file_id {
        Some(id) if settings.use_hash_id && !params.profile => Some(hash32(id).to_string()),
        Some(id) => Some(id.to_string()),
        None => None,
    };

    let mut name = file_id.clone();
    if let (Some(username), Some(datetime), Some(id)) =
        (params.username, params.datetime, file_id.as_deref())
    {
        let template = if settings.use_datetime {
            settings.filename_format.clone()
        } else {
            DATETIME_PLACEHOLDER_RE
                .replace_all(&settings.filename_format, "")
                .into_owned()
        };
        let rendered = if settings.use_datetime {
            render_datetime(&datetime, &settings.datetime_format)
        } else {
            String::new()
        };
        name = Some(
            template
                .replace("{username}", username)
                .replace("{datetime}", &rendered)
                .replace("{id}", id),
        );
    }

    match name {
        Some(name) if !name.is_empty() => name,
        _ => media_name(params.url),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn params<'a>(
        username: Option<&'a str>,
        datetime: Option<DateTime<Utc>>,
        file_id: Option<&'a str>,
    ) -> FilenameParams<'a> {
        FilenameParams {
            url: "https://cdn.example/media/450_n.jpg?x=1",
            username,
            datetime,
            file_id,
            profile: false,
        }
    }

    #[test]
    fn test_documented_example() {
        // template {username}-{id}-{datetime}, alice/42/2024-01-01T00:00:00Z
        let settings = Settings::default();
        let name = format_filename(&params(Some("alice"), Some(at(1_704_067_200)), Some("42")), &settings);
        assert_eq!(name, "alice-42-2024-01-01_00-00-00");
    }

    #[test]
    fn test_placeholder_order_follows_template() {
        let settings = Settings {
            filename_format: "{id}_{datetime}_{username}".to_string(),
            ..Settings::default()
        };
        let name = format_filename(&params(Some("bob"), Some(at(0)), Some("7")), &settings);
        assert_eq!(name, "7_1970-01-01_00-00-00_bob");
    }

    #[test]
    fn test_hash32_is_pure_and_unsigned() {
        assert_eq!(hash32("3141592653589793238"), hash32("3141592653589793238"));
        assert_ne!(hash32("a"), hash32("b"));
        assert_eq!(hash32(""), 0);
        // "hello" under h = h*31 + unit
        assert_eq!(hash32("hello"), 99_162_322);
    }

    #[test]
    fn test_hash_id_applied_outside_profile_scope() {
        let settings = Settings {
            use_hash_id: true,
            use_datetime: false,
            ..Settings::default()
        };
        let hashed = format_filename(&params(Some("alice"), Some(at(0)), Some("42")), &settings);
        assert_eq!(hashed, format!("alice-{}", hash32("42")));

        let mut profile = params(Some("alice"), Some(at(0)), Some("42"));
        profile.profile = true;
        let unhashed = format_filename(&profile, &settings);
        assert_eq!(unhashed, "alice-42");
    }

    #[test]
    fn test_datetime_disabled_leaves_no_stray_separator() {
        let settings = Settings {
            use_datetime: false,
            ..Settings::default()
        };
        let name = format_filename(&params(Some("alice"), Some(at(0)), Some("42")), &settings);
        assert!(!name.contains("{datetime}"));
        assert_eq!(name, "alice-42");

        let middle = Settings {
            use_datetime: false,
            filename_format: "{username}_{datetime}_{id}".to_string(),
            ..Settings::default()
        };
        // Both separators around the placeholder are stripped.
        let name = format_filename(&params(Some("alice"), Some(at(0)), Some("42")), &middle);
        assert_eq!(name, "alice42");
    }

    #[test]
    fn test_missing_triple_falls_back_to_file_id_then_basename() {
        let settings = Settings::default();
        let only_id = format_filename(&params(None, None, Some("99_5")), &settings);
        assert_eq!(only_id, "99_5");

        let nothing = format_filename(&params(None, None, None), &settings);
        assert_eq!(nothing, "450_n");
    }

    #[test]
    fn test_apply_media_index_appends_when_indexing_enabled() {
        let id = apply_media_index(Some("42".to_string()), Some(2), true, "https://cdn/x.jpg");
        assert_eq!(id.as_deref(), Some("42_3"));
    }

    #[test]
    fn test_apply_media_index_overrides_with_basename_when_disabled() {
        let id = apply_media_index(
            Some("42".to_string()),
            Some(2),
            false,
            "https://cdn.example/media/450_n.jpg?x=1",
        );
        assert_eq!(id.as_deref(), Some("450_n"));
    }

    #[test]
    fn test_apply_media_index_passthrough_without_index() {
        let id = apply_media_index(Some("42".to_string()), None, true, "https://cdn/x.jpg");
        assert_eq!(id.as_deref(), Some("42"));
    }

    #[test]
    fn test_render_datetime_token_translation() {
        let dt = at(1_704_067_200); // 2024-01-01T00:00:00Z
        assert_eq!(render_datetime(&dt, "YYYY-MM-DD_hh-mm-ss"), "2024-01-01_00-00-00");
        assert_eq!(render_datetime(&dt, "YYYYMMDD"), "20240101");
        assert_eq!(render_datetime(&dt, "DD.MM.YYYY HH:mm"), "01.01.2024 00:00");
    }

    #[test]
    fn test_formatting_is_deterministic() {
        let settings = Settings::default();
        let input = params(Some("alice"), Some(at(1_700_000_000)), Some("42"));
        assert_eq!(
            format_filename(&input, &settings),
            format_filename(&input, &settings)
        );
    }
}
