//! Settings surface supplied by the external settings subsystem.
//!
//! The blob arrives with the wire keys the storage layer uses
//! (`setting_format_*`); nothing here is persisted by this crate.

use serde::{Deserialize, Serialize};

/// Default filename template.
pub const DEFAULT_FILENAME_FORMAT: &str = "{username}-{id}-{datetime}";

/// Default datetime rendering pattern (dayjs-style tokens).
pub const DEFAULT_DATETIME_FORMAT: &str = "YYYY-MM-DD_hh-mm-ss";

/// Per-flow configuration snapshot.
///
/// The settings UI keeps hash-id and indexing mutually exclusive; the core
/// does not re-enforce that coupling and formats whatever it is handed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Replace the file id with a 32-bit hash of itself.
    #[serde(rename = "setting_format_use_hash_id", default)]
    pub use_hash_id: bool,

    /// Append the media index to the file id for carousel items.
    #[serde(rename = "setting_format_use_indexing", default = "default_true")]
    pub use_indexing: bool,

    /// Include the formatted datetime in the filename.
    #[serde(rename = "setting_format_use_datetime", default = "default_true")]
    pub use_datetime: bool,

    /// Normalize the `jpeg` extension to `jpg`.
    #[serde(rename = "setting_format_replace_jpeg_with_jpg", default)]
    pub replace_jpeg_with_jpg: bool,

    /// Filename template with `{username}`, `{datetime}`, `{id}` placeholders.
    #[serde(
        rename = "setting_format_filename",
        default = "default_filename_format"
    )]
    pub filename_format: String,

    /// Datetime rendering pattern (dayjs-style tokens).
    #[serde(
        rename = "setting_format_datetime",
        default = "default_datetime_format"
    )]
    pub datetime_format: String,

    /// Download every carousel item as one zipped batch instead of the
    /// currently visible item.
    #[serde(rename = "setting_enable_download_multiple_media", default)]
    pub download_multiple_media: bool,
}

fn default_true() -> bool {
    true
}

fn default_filename_format() -> String {
    DEFAULT_FILENAME_FORMAT.to_string()
}

fn default_datetime_format() -> String {
    DEFAULT_DATETIME_FORMAT.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_hash_id: false,
            use_indexing: true,
            use_datetime: true,
            replace_jpeg_with_jpg: false,
            filename_format: default_filename_format(),
            datetime_format: default_datetime_format(),
            download_multiple_media: false,
        }
    }
}
