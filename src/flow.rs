//! One download flow: classify the interaction, locate the post, resolve its
//! media, format names, fetch, and emit an artifact.
//!
//! Every triggered control runs this pipeline independently and to
//! completion; there is no cross-flow dedup or retry. Repeat work is absorbed
//! by the session caches instead.

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::download::{Artifact, DownloadError, DownloadRequest, assemble_batch, assemble_single};
use crate::format::apply_media_index;
use crate::locator::{Interaction, LocatorError, PostContext, classify, locate};
use crate::normalize::canonicalize_video_url;
use crate::page::{NodeId, Page};
use crate::resolve::{
    ApiResolver, DomFallbackResolver, MediaReference, MediaResolver, Resolved, ResolveError,
    Session,
};
use crate::settings::Settings;
use crate::util::media_name;

/// Pipeline stage, for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    /// Classifying the interaction and locating the post container.
    Locating,
    /// Resolving media references.
    Resolving,
    /// Canonicalizing resolved video URLs.
    Normalizing,
    /// Building filenames and download requests.
    Formatting,
    /// Fetching bytes and packaging the artifact.
    Fetching,
}

/// A flow failure, tagged by origin stage.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Locating the post failed.
    #[error("locating the post failed")]
    Locator(#[from] LocatorError),

    /// Both resolution strategies failed.
    #[error("resolving media failed")]
    Resolve(#[from] ResolveError),

    /// Fetching or packaging failed.
    #[error("downloading media failed")]
    Download(#[from] DownloadError),

    /// The profile header exposed no picture to download.
    #[error("no profile picture found in the header")]
    ProfilePictureNotFound,
}

/// Runs download flows against one page session.
pub struct Flow {
    session: Session,
}

impl Flow {
    /// Builds a flow runner over its own session.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, ResolveError> {
        Ok(Self {
            session: Session::new()?,
        })
    }

    /// Builds a flow runner over an existing session, keeping its caches.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self { session }
    }

    /// The underlying session, exposed for cache inspection.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs one complete flow for a triggered control and returns the
    /// artifact for the host to save.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError`] from whichever stage failed first.
    #[tracing::instrument(skip_all, fields(url = %page.location.href()))]
    pub async fn run(
        &self,
        page: &Page,
        control: NodeId,
        settings: &Settings,
    ) -> Result<Artifact, FlowError> {
        debug!(stage = ?FlowStage::Locating);
        let interaction = classify(page, control);
        debug!(?interaction, "interaction classified");

        if interaction == Interaction::Profile {
            return self.run_profile(page, control, settings).await;
        }

        let (container, ctx) = locate(page, control)?;

        debug!(stage = ?FlowStage::Resolving, post_id = %ctx.post_id);
        let resolved = self.resolve(page, container, &ctx, settings).await?;

        match resolved {
            Resolved::Single(media) => self.emit_single(&ctx, media, settings).await,
            Resolved::Many(items) => self.emit_batch(items, settings).await,
        }
    }

    /// Resolves through the structured API path first; when that fails and
    /// the container holds a video element, falls back to the DOM scrape.
    async fn resolve(
        &self,
        page: &Page,
        container: NodeId,
        ctx: &PostContext,
        settings: &Settings,
    ) -> Result<Resolved, ResolveError> {
        let api = ApiResolver::new();
        match api.resolve(&self.session, page, container, ctx, settings).await {
            Ok(resolved) => Ok(resolved),
            Err(api_error) => {
                if page.dom.find_descendant_by_tag(container, "video").is_none() {
                    return Err(api_error);
                }
                debug!(error = %api_error, "structured resolution failed; trying the DOM fallback");
                let fallback = DomFallbackResolver::new();
                fallback
                    .resolve(&self.session, page, container, ctx, settings)
                    .await
            }
        }
    }

    async fn emit_single(
        &self,
        ctx: &PostContext,
        media: MediaReference,
        settings: &Settings,
    ) -> Result<Artifact, FlowError> {
        debug!(stage = ?FlowStage::Normalizing);
        let url = normalized_url(&media);

        debug!(stage = ?FlowStage::Formatting);
        let index = ctx.is_carousel.then_some(ctx.media_index);
        let request = build_request(&media, url, index, settings, false);

        debug!(stage = ?FlowStage::Fetching);
        let artifact = assemble_single(
            self.session.client(),
            self.session.page_base(),
            &request,
            settings,
            false,
        )
        .await?;
        debug!(filename = %artifact.filename(), "flow complete");
        Ok(artifact)
    }

    async fn emit_batch(
        &self,
        items: Vec<MediaReference>,
        settings: &Settings,
    ) -> Result<Artifact, FlowError> {
        debug!(stage = ?FlowStage::Formatting, items = items.len());
        let requests: Vec<DownloadRequest> = items
            .iter()
            .enumerate()
            .map(|(index, media)| {
                let url = normalized_url(media);
                let mut request = build_request(media, url, Some(index), settings, true);
                // Batch entries always format with the full triple so the
                // archive never mixes naming schemes.
                if request.username.is_none() {
                    request.username = Some("unknown_user".to_string());
                }
                if request.datetime.is_none() {
                    request.datetime = Some(Utc::now());
                }
                request
            })
            .collect();

        debug!(stage = ?FlowStage::Fetching);
        let artifact = assemble_batch(
            self.session.client(),
            self.session.page_base(),
            &requests,
            settings,
        )
        .await?;
        debug!(filename = %artifact.filename(), "flow complete");
        Ok(artifact)
    }

    /// Downloads the profile picture from the header image.
    async fn run_profile(
        &self,
        page: &Page,
        control: NodeId,
        settings: &Settings,
    ) -> Result<Artifact, FlowError> {
        let dom = &page.dom;
        let header = dom
            .find_ancestor(control, |dom, id| dom.tag(id) == "header")
            .ok_or(FlowError::ProfilePictureNotFound)?;
        let img = dom
            .find_descendant_by_tag(header, "img")
            .ok_or(FlowError::ProfilePictureNotFound)?;
        let url = dom
            .attr(img, "src")
            .map(ToString::to_string)
            .ok_or(FlowError::ProfilePictureNotFound)?;

        // The profile path's first segment is the username.
        let username = page
            .location
            .path_segments()
            .first()
            .map(ToString::to_string);

        let request = DownloadRequest {
            file_id: Some(media_name(&url)),
            url,
            username,
            datetime: None,
            batch: false,
        };
        let artifact = assemble_single(
            self.session.client(),
            self.session.page_base(),
            &request,
            settings,
            true,
        )
        .await?;
        debug!(filename = %artifact.filename(), "profile flow complete");
        Ok(artifact)
    }
}

/// Canonicalizes video URLs; image URLs and ephemeral references pass
/// through untouched.
fn normalized_url(media: &MediaReference) -> String {
    if media.is_video() && !media.url.starts_with("blob:") {
        canonicalize_video_url(&media.url)
    } else {
        media.url.clone()
    }
}

fn build_request(
    media: &MediaReference,
    url: String,
    media_index: Option<usize>,
    settings: &Settings,
    batch: bool,
) -> DownloadRequest {
    let file_id = media
        .file_id()
        .map(ToString::to_string)
        .or_else(|| Some(media_name(&url)));
    let file_id = apply_media_index(file_id, media_index, settings.use_indexing, &url);
    DownloadRequest {
        url,
        username: media.owner.clone(),
        datetime: media.taken_at,
        file_id,
        batch,
    }
}
