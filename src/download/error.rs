//! Errors from the download assembly stage.

use thiserror::Error;

/// Failure while fetching or packaging media.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The transport-level fetch failed.
    #[error("fetching {url} failed")]
    Network {
        /// The URL being fetched.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("fetching {url} answered status {status}")]
    HttpStatus {
        /// The URL being fetched.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Every batch item failed; there is nothing to archive.
    #[error("batch archive would be empty")]
    EmptyArchive,

    /// The zip writer rejected an entry.
    #[error("writing the batch archive failed")]
    Archive(#[from] zip::result::ZipError),

    /// Plain I/O failure while streaming bytes into the archive.
    #[error("writing archive bytes failed")]
    ArchiveIo(#[source] std::io::Error),
}

impl DownloadError {
    pub(crate) fn network(url: &str, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn http_status(url: &str, status: u16) -> Self {
        Self::HttpStatus {
            url: url.to_string(),
            status,
        }
    }

    pub(crate) fn archive_io(source: std::io::Error) -> Self {
        Self::ArchiveIo(source)
    }
}
