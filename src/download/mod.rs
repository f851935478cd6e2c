//! Download assembly: fetching resolved media bytes and emitting either a
//! single file or one zipped batch archive.
//!
//! The crate's outbound boundary is the [`Artifact`] value; the host layer
//! performs the actual save or open side effect.

mod error;

pub use error::DownloadError;

use std::io::Write;

use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, ORIGIN};
use tracing::{debug, warn};

use crate::format::{FilenameParams, format_filename};
use crate::settings::Settings;

/// Extensions accepted from a URL path when the content-type is unusable.
const KNOWN_MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "mp4", "webm", "mov"];

/// Fixed extension for ephemeral in-browser video references.
const BLOB_EXTENSION: &str = "mp4";

/// Input to filename formatting and fetching for one resource.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Resolved (and normalized) media URL.
    pub url: String,
    /// Posting username.
    pub username: Option<String>,
    /// Capture time.
    pub datetime: Option<DateTime<Utc>>,
    /// Effective file id (index policy already applied).
    pub file_id: Option<String>,
    /// Whether this request is part of a batch.
    pub batch: bool,
}

/// A successfully fetched resource, ready for packaging.
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    /// Raw media bytes.
    pub bytes: Vec<u8>,
    /// Formatted filename, extension not included.
    pub filename: String,
    /// Derived extension, no leading dot.
    pub extension: String,
}

/// What a completed flow hands back to the host for the save side effect.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// A single fetched file.
    File {
        /// Full filename including extension.
        filename: String,
        /// The file body.
        bytes: Vec<u8>,
    },
    /// An ephemeral in-browser reference only the host page can read, or an
    /// open-in-new-tab convenience; the host saves/opens the URL directly.
    Reference {
        /// Full filename including extension.
        filename: String,
        /// The source URL.
        url: String,
    },
    /// A zipped batch of fetched files.
    Archive {
        /// Timestamp-derived archive name.
        filename: String,
        /// The zip body.
        bytes: Vec<u8>,
    },
}

impl Artifact {
    /// The filename the host should save under.
    #[must_use]
    pub fn filename(&self) -> &str {
        match self {
            Self::File { filename, .. }
            | Self::Reference { filename, .. }
            | Self::Archive { filename, .. } => filename,
        }
    }
}

/// Fetches one resource and emits a single-file artifact.
///
/// Ephemeral `blob:` references cannot be fetched out of the page; they pass
/// through as [`Artifact::Reference`] with the fixed video extension.
///
/// # Errors
///
/// Returns [`DownloadError`] when the fetch fails or answers non-success.
#[tracing::instrument(skip_all, fields(url = %request.url))]
pub async fn assemble_single(
    client: &Client,
    origin: &str,
    request: &DownloadRequest,
    settings: &Settings,
    profile: bool,
) -> Result<Artifact, DownloadError> {
    let filename = format_filename(&filename_params(request, profile), settings);

    if request.url.starts_with("blob:") {
        return Ok(Artifact::Reference {
            filename: format!("{filename}.{BLOB_EXTENSION}"),
            url: request.url.clone(),
        });
    }

    let response = client
        .get(&request.url)
        .header(ORIGIN, origin)
        .send()
        .await
        .map_err(|source| DownloadError::network(&request.url, source))?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::http_status(&request.url, status.as_u16()));
    }

    let content_type = header_value(&response, CONTENT_TYPE);
    let bytes = response
        .bytes()
        .await
        .map_err(|source| DownloadError::network(&request.url, source))?;

    let extension = normalize_extension(
        extension_from_content_type(&content_type).unwrap_or_else(|| "jpg".to_string()),
        settings,
    );

    Ok(Artifact::File {
        filename: format!("{filename}.{extension}"),
        bytes: bytes.to_vec(),
    })
}

/// Fetches every item strictly sequentially and packages the successes into
/// one zip archive. A failed item is logged and skipped; later entries
/// sharing a name overwrite earlier ones.
///
/// # Errors
///
/// Returns [`DownloadError::EmptyArchive`] when no item could be fetched,
/// or an archive write error.
#[tracing::instrument(skip_all, fields(items = requests.len()))]
pub async fn assemble_batch(
    client: &Client,
    origin: &str,
    requests: &[DownloadRequest],
    settings: &Settings,
) -> Result<Artifact, DownloadError> {
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

    for request in requests {
        match fetch_batch_item(client, origin, request, settings).await {
            Ok(resource) => {
                let name = format!("{}.{}", resource.filename, resource.extension);
                debug!(entry = %name, "batch item fetched");
                push_entry(&mut entries, name, resource.bytes);
            }
            Err(error) => {
                warn!(url = %request.url, error = %error, "batch item failed; skipping");
            }
        }
    }

    if entries.is_empty() {
        warn!(items = requests.len(), "every batch item failed; nothing to archive");
        return Err(DownloadError::EmptyArchive);
    }

    let bytes = write_archive(&entries)?;
    Ok(Artifact::Archive {
        filename: format!("IG_Media_{}.zip", Utc::now().timestamp_millis()),
        bytes,
    })
}

/// Fetches one batch item and derives its entry name.
///
/// # Errors
///
/// Returns [`DownloadError`] on transport failure or a non-success status.
pub async fn fetch_batch_item(
    client: &Client,
    origin: &str,
    request: &DownloadRequest,
    settings: &Settings,
) -> Result<ResolvedResource, DownloadError> {
    let filename = format_filename(&filename_params(request, false), settings);

    // blob: sources carry no Origin header; the fetch is expected to fail
    // outside the page and the item gets skipped by the caller.
    let mut builder = client.get(&request.url);
    if !request.url.starts_with("blob:") {
        builder = builder.header(ORIGIN, origin);
    }
    let response = builder
        .send()
        .await
        .map_err(|source| DownloadError::network(&request.url, source))?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::http_status(&request.url, status.as_u16()));
    }

    let content_type = header_value(&response, CONTENT_TYPE);
    let bytes = response
        .bytes()
        .await
        .map_err(|source| DownloadError::network(&request.url, source))?;

    let mut extension =
        extension_from_content_type(&content_type).unwrap_or_else(|| "bin".to_string());
    if (extension == "bin" || extension == "octet-stream" || content_type.is_empty())
        && let Some(from_path) = extension_from_url_path(&request.url)
    {
        extension = from_path;
    }
    extension = normalize_extension(extension, settings);
    if extension.is_empty() || extension == "octet-stream" {
        extension = "bin".to_string();
    }

    Ok(ResolvedResource {
        bytes: bytes.to_vec(),
        filename,
        extension,
    })
}

fn filename_params<'a>(request: &'a DownloadRequest, profile: bool) -> FilenameParams<'a> {
    FilenameParams {
        url: &request.url,
        username: request.username.as_deref(),
        datetime: request.datetime,
        file_id: request.file_id.as_deref(),
        profile,
    }
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Lower-cased subtype of the content-type, e.g. `image/jpeg` → `jpeg`.
fn extension_from_content_type(content_type: &str) -> Option<String> {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    let (_, subtype) = mime.split_once('/')?;
    let subtype = subtype.trim().to_ascii_lowercase();
    (!subtype.is_empty()).then_some(subtype)
}

/// URL path extension, accepted only from the known media set.
fn extension_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let path = parsed.path();
    let last_segment = path.rsplit('/').next()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    KNOWN_MEDIA_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn normalize_extension(extension: String, settings: &Settings) -> String {
    if settings.replace_jpeg_with_jpg && extension == "jpeg" {
        "jpg".to_string()
    } else {
        extension
    }
}

/// Appends an entry; an existing entry with the same name is overwritten in
/// place, keeping its position.
fn push_entry(entries: &mut Vec<(String, Vec<u8>)>, name: String, bytes: Vec<u8>) {
    if let Some(slot) = entries.iter_mut().find(|(existing, _)| *existing == name) {
        slot.1 = bytes;
    } else {
        entries.push((name, bytes));
    }
}

fn write_archive(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, DownloadError> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in entries {
        writer.start_file(name.clone(), options)?;
        writer.write_all(bytes).map_err(DownloadError::archive_io)?;
    }
    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}
