//! Error types for the resolution pipeline.

use thiserror::Error;

/// Errors that can occur while resolving media metadata.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No client app id was discoverable in the page's inline scripts.
    #[error("no app id found in inline page scripts")]
    AppIdNotFound,

    /// The permalink HTML carried no recognizable media id.
    #[error("no media id found for post {post_id}")]
    MediaIdNotFound {
        /// The post whose permalink was scanned.
        post_id: String,
    },

    /// The info endpoint answered with a non-200 status.
    #[error("info endpoint returned HTTP {status} for media {media_id}")]
    InfoStatus {
        /// The requested media id.
        media_id: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response or page content did not have the expected shape.
    #[error("malformed resolution data: {reason}")]
    Malformed {
        /// What was missing or unparseable.
        reason: String,
    },

    /// The DOM fallback scrape found no video URL near the poster token.
    #[error("fallback pattern matched nothing in the permalink HTML")]
    FallbackPatternNotFound,

    /// Transport-level failure on a resolution fetch.
    #[error("resolution request failed: {source}")]
    Http {
        /// The underlying client error.
        #[from]
        source: reqwest::Error,
    },
}

impl ResolveError {
    /// Creates a malformed-data error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
