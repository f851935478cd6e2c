//! Media resolution: turning a located post context into downloadable media
//! references.
//!
//! Two strategies sit behind the same [`MediaResolver`] interface:
//!
//! - [`ApiResolver`] - the structured path: post id → numeric media id
//!   (cached) → info endpoint metadata (cached).
//! - [`DomFallbackResolver`] - a regex scrape of the permalink HTML used when
//!   a displayed video exposes only an ephemeral in-browser source. Fragile
//!   by nature: it tracks upstream markup and breaks when that changes.
//!
//! Both strategies read shared state only through the injected [`Session`],
//! so cache behavior is testable in isolation.

mod dom_fallback;
mod error;
mod info_api;
mod media_id;
mod session;

pub use dom_fallback::DomFallbackResolver;
pub use error::ResolveError;
pub use info_api::{ApiResolver, discover_app_id, fetch_media_info};
pub use media_id::resolve_media_id;
pub use session::{Cache, Session};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::locator::PostContext;
use crate::page::{NodeId, Page};
use crate::settings::Settings;

/// One resolvable media item with its post-level decoration.
#[derive(Debug, Clone)]
pub struct MediaReference {
    /// Direct media URL (image candidate or video version head).
    pub url: String,
    /// Pixel dimensions of the chosen version, when reported.
    pub resolution: Option<(u32, u32)>,
    /// Capture time, post-level fallback applied.
    pub taken_at: Option<DateTime<Utc>>,
    /// Owning username, post-level fallback applied.
    pub owner: Option<String>,
    /// Co-author usernames.
    pub coauthors: Vec<String>,
    /// The raw metadata object this reference was derived from.
    pub origin_data: Value,
}

impl MediaReference {
    /// API-provided media item id, when the origin metadata carries one.
    #[must_use]
    pub fn file_id(&self) -> Option<&str> {
        self.origin_data.get("id").and_then(Value::as_str)
    }

    /// Whether the origin metadata describes a video.
    #[must_use]
    pub fn is_video(&self) -> bool {
        self.origin_data.get("video_versions").is_some() || self.url.ends_with(".mp4")
    }
}

/// Outcome of a resolution: the requested item, or every carousel item for
/// batch use.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// One media item.
    Single(MediaReference),
    /// All carousel items, in post order.
    Many(Vec<MediaReference>),
}

/// A resolution strategy. The structured API path and the DOM fallback both
/// implement this, so the flow can chain them behind one interface.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Strategy name for diagnostics.
    fn name(&self) -> &str;

    /// Resolves media references for the located context.
    async fn resolve(
        &self,
        session: &Session,
        page: &Page,
        container: NodeId,
        ctx: &PostContext,
        settings: &Settings,
    ) -> Result<Resolved, ResolveError>;
}
