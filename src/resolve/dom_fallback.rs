//! Regex fallback for video URLs the DOM only exposes as ephemeral
//! in-browser references.
//!
//! The displayed video carries a poster image whose filename token also
//! appears in the permalink's embedded JSON, right next to the real
//! `video_versions` URL. The scrape anchors on that token and searches
//! across line boundaries. This tracks upstream markup and is expected to
//! break when the platform changes its inline payloads; it exists only as a
//! last resort behind the same interface as the structured path.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::locator::PostContext;
use crate::normalize::canonicalize_video_url;
use crate::page::{NodeId, Page};
use crate::settings::Settings;
use crate::util::compile_static_regex;

use super::{MediaReference, MediaResolver, Resolved, ResolveError, Session};

/// Ephemeral attribute carrying an already-resolved video URL.
const VIDEO_URL_ATTR: &str = "videoURL";

static POSTER_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/([^/?]*)\?"));

/// The regex-scrape fallback strategy.
#[derive(Debug, Default)]
pub struct DomFallbackResolver;

impl DomFallbackResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaResolver for DomFallbackResolver {
    fn name(&self) -> &'static str {
        "dom-fallback"
    }

    #[tracing::instrument(skip_all, fields(resolver = "dom-fallback", post_id = %_ctx.post_id))]
    async fn resolve(
        &self,
        session: &Session,
        page: &Page,
        container: NodeId,
        _ctx: &PostContext,
        _settings: &Settings,
    ) -> Result<Resolved, ResolveError> {
        let video = page
            .dom
            .find_descendant_by_tag(container, "video")
            .ok_or_else(|| ResolveError::malformed("no video element under the post container"))?;
        let url = video_source(session, page, container, video).await?;
        Ok(Resolved::Single(MediaReference {
            url,
            resolution: None,
            taken_at: None,
            owner: None,
            coauthors: Vec::new(),
            origin_data: Value::Null,
        }))
    }
}

/// A usable source for the video element: the cached ephemeral URL, a
/// non-ephemeral `src`, or a fresh permalink scrape.
pub(crate) async fn video_source(
    session: &Session,
    page: &Page,
    container: NodeId,
    video: NodeId,
) -> Result<String, ResolveError> {
    if let Some(cached) = page.dom.ephemeral_attr(video, VIDEO_URL_ATTR) {
        debug!("video URL served from element attribute");
        return Ok(cached);
    }
    if let Some(src) = page.dom.attr(video, "src")
        && !src.contains("blob")
    {
        return Ok(src.to_string());
    }
    fetch_video_url(session, page, container, video).await
}

/// Scrapes the permalink HTML for the `video_versions` URL anchored near the
/// poster's filename token, and caches the result on the element.
async fn fetch_video_url(
    session: &Session,
    page: &Page,
    container: NodeId,
    video: NodeId,
) -> Result<String, ResolveError> {
    let dom = &page.dom;
    let poster = dom
        .attr(video, "poster")
        .ok_or_else(|| ResolveError::malformed("video element has no poster attribute"))?;
    let token = POSTER_TOKEN_RE
        .captures(poster)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .ok_or_else(|| ResolveError::malformed("poster URL has no filename token"))?;

    let permalink = permalink_from_timestamp(session, page, container)?;
    debug!(url = %permalink, token = %token, "fetching permalink for video URL scrape");
    let html = session
        .client()
        .get(&permalink)
        .send()
        .await?
        .text()
        .await?;

    // (?s) so the search crosses line boundaries in the inline JSON blob.
    let pattern = format!(
        r#"(?s){}.*?video_versions.*?url":("[^"]*")"#,
        regex::escape(&token)
    );
    let url_re = Regex::new(&pattern)
        .map_err(|e| ResolveError::malformed(format!("poster token made an invalid pattern: {e}")))?;
    let literal = url_re
        .captures(&html)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .ok_or(ResolveError::FallbackPatternNotFound)?;

    // The capture is a JSON string literal, escapes and all.
    let raw: String = serde_json::from_str(&literal)
        .map_err(|e| ResolveError::malformed(format!("video URL literal did not parse: {e}")))?;
    let url = canonicalize_video_url(&raw);

    dom.set_ephemeral_attr(video, VIDEO_URL_ATTR, &url);
    Ok(url)
}

/// The permalink enclosing the container's last timestamp element.
fn permalink_from_timestamp(
    session: &Session,
    page: &Page,
    container: NodeId,
) -> Result<String, ResolveError> {
    let dom = &page.dom;
    let times = dom.descendants_by_tag(container, "time");
    let last = times
        .last()
        .copied()
        .ok_or_else(|| ResolveError::malformed("no timestamp element under the post container"))?;
    let anchor = dom
        .find_ancestor(last, |dom, id| {
            dom.tag(id) == "a" && dom.attr(id, "href").is_some()
        })
        .ok_or_else(|| ResolveError::malformed("timestamp element has no enclosing permalink"))?;
    let href = dom.attr(anchor, "href").unwrap_or_default();

    if href.starts_with("http://") || href.starts_with("https://") {
        Ok(href.to_string())
    } else {
        Ok(format!(
            "{}/{}",
            session.page_base().trim_end_matches('/'),
            href.trim_start_matches('/')
        ))
    }
}
