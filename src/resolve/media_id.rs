//! Post id → numeric media id resolution.
//!
//! Story URLs already embed the id. Everything else goes through the
//! permalink HTML, which references the id either as a custom URI scheme
//! (`instagram://media?id=...`) or as a quoted `media_id` field; whichever
//! alternative captures wins. Results are cached per post id for the page
//! session.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::locator::PostContext;
use crate::page::Page;
use crate::util::{STORY_MEDIA_ID_RE, compile_static_regex};

use super::{ResolveError, Session};

static MEDIA_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"instagram://media\?id=(\d+)|["' ]media_id["' ]:["' ](\d+)["' ]"#)
});

/// Resolves the stable numeric media id for a post.
///
/// # Errors
///
/// Returns [`ResolveError::MediaIdNotFound`] when the permalink HTML matches
/// neither id pattern, or [`ResolveError::Http`] on a failed fetch.
#[tracing::instrument(skip(session, page, ctx), fields(post_id = %ctx.post_id))]
pub async fn resolve_media_id(
    session: &Session,
    page: &Page,
    ctx: &PostContext,
) -> Result<String, ResolveError> {
    if let Some(media_id) = &ctx.media_id {
        return Ok(media_id.clone());
    }
    if let Some(caps) = STORY_MEDIA_ID_RE.captures(page.location.href())
        && let Some(id) = caps.get(1)
    {
        return Ok(id.as_str().to_string());
    }

    if let Some(cached) = session.media_ids().get(&ctx.post_id) {
        debug!(media_id = %cached, "media id served from cache");
        return Ok(cached);
    }

    let permalink = session.permalink_url(&ctx.post_id);
    debug!(url = %permalink, "fetching permalink for media id discovery");
    let html = session
        .client()
        .get(&permalink)
        .send()
        .await?
        .text()
        .await?;

    let media_id = MEDIA_ID_RE
        .captures(&html)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ResolveError::MediaIdNotFound {
            post_id: ctx.post_id.clone(),
        })?;

    Ok(session
        .media_ids()
        .insert_if_absent(ctx.post_id.clone(), media_id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_media_id_pattern_matches_uri_scheme_alternative() {
        let html = r#"<script>{"al:ios:url":"instagram://media?id=31415926535"}</script>"#;
        let caps = MEDIA_ID_RE.captures(html).unwrap();
        assert_eq!(caps.get(1).unwrap().as_str(), "31415926535");
        assert!(caps.get(2).is_none());
    }

    #[test]
    fn test_media_id_pattern_matches_quoted_field_alternative() {
        let html = r#"<script>{"media_id":"27182818284"}</script>"#;
        let caps = MEDIA_ID_RE.captures(html).unwrap();
        assert!(caps.get(1).is_none());
        assert_eq!(caps.get(2).unwrap().as_str(), "27182818284");
    }

    #[test]
    fn test_media_id_pattern_rejects_unrelated_html() {
        assert!(MEDIA_ID_RE.captures("<html><body>nothing here</body></html>").is_none());
    }
}
