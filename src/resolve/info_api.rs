//! Structured resolution through the platform's internal info endpoint.
//!
//! The endpoint wants a client app id that only appears inside inline page
//! scripts, so discovery scans those first. Responses are cached raw per
//! media id; interpretation (carousel vs. single, post-level fallbacks)
//! happens on every call against the cached value.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::locator::PostContext;
use crate::page::{Dom, NodeId, Page};
use crate::settings::Settings;
use crate::util::compile_static_regex;

use super::{MediaReference, MediaResolver, Resolved, ResolveError, Session};

static APP_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#""X-IG-App-ID":"(\d+)""#));

/// Finds the client app id in inline script contents; first match wins.
///
/// # Errors
///
/// Returns [`ResolveError::AppIdNotFound`] when no script carries the key.
pub fn discover_app_id(dom: &Dom) -> Result<String, ResolveError> {
    for script in dom.descendants_by_tag(dom.root(), "script") {
        if let Some(caps) = APP_ID_RE.captures(dom.text(script))
            && let Some(id) = caps.get(1)
        {
            return Ok(id.as_str().to_string());
        }
    }
    Err(ResolveError::AppIdNotFound)
}

/// Fetches (or serves from cache) the raw info response for a media id.
///
/// # Errors
///
/// Returns [`ResolveError::InfoStatus`] on a non-200 answer and
/// [`ResolveError::Http`] on transport failure.
#[tracing::instrument(skip(session, app_id), fields(media_id = %media_id))]
pub async fn fetch_media_info(
    session: &Session,
    app_id: &str,
    media_id: &str,
) -> Result<Arc<Value>, ResolveError> {
    if let Some(cached) = session.media_info().get(media_id) {
        debug!("info response served from cache");
        return Ok(cached);
    }

    let url = session.info_url(media_id);
    debug!(url = %url, "fetching media info");
    let response = session
        .client()
        .get(&url)
        .header(reqwest::header::ACCEPT, "*/*")
        .header("X-IG-App-ID", app_id)
        .send()
        .await?;

    let status = response.status();
    if status.as_u16() != 200 {
        return Err(ResolveError::InfoStatus {
            media_id: media_id.to_string(),
            status: status.as_u16(),
        });
    }

    let json: Value = response.json().await?;
    Ok(session
        .media_info()
        .insert_if_absent(media_id.to_string(), Arc::new(json)))
}

/// The structured resolution strategy.
#[derive(Debug, Default)]
pub struct ApiResolver;

impl ApiResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaResolver for ApiResolver {
    fn name(&self) -> &'static str {
        "info-api"
    }

    #[tracing::instrument(skip_all, fields(resolver = "info-api", post_id = %ctx.post_id))]
    async fn resolve(
        &self,
        session: &Session,
        page: &Page,
        _container: NodeId,
        ctx: &PostContext,
        settings: &Settings,
    ) -> Result<Resolved, ResolveError> {
        let app_id = discover_app_id(&page.dom)?;
        let media_id = super::resolve_media_id(session, page, ctx).await?;
        let info = fetch_media_info(session, &app_id, &media_id).await?;

        let post = info
            .get("items")
            .and_then(|items| items.get(0))
            .ok_or_else(|| ResolveError::malformed("info response has no items[0]"))?;

        interpret_post(post, ctx.media_index, settings.download_multiple_media)
    }
}

/// Interprets `items[0]`: carousel (indexed or batch) vs. single media.
fn interpret_post(
    post: &Value,
    media_index: usize,
    download_multiple: bool,
) -> Result<Resolved, ResolveError> {
    match post.get("carousel_media").and_then(Value::as_array) {
        Some(carousel) => {
            if download_multiple {
                let items = carousel
                    .iter()
                    .map(|item| decorate_batch_item(item, post))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Resolved::Many(items));
            }
            let item = carousel.get(media_index).ok_or_else(|| {
                ResolveError::malformed(format!(
                    "carousel index {media_index} out of range ({} items)",
                    carousel.len()
                ))
            })?;
            Ok(Resolved::Single(decorate_indexed_item(item, post)?))
        }
        None => Ok(Resolved::Single(decorate_single(post)?)),
    }
}

/// The indexed carousel item: capture time and co-authors come from the post.
fn decorate_indexed_item(item: &Value, post: &Value) -> Result<MediaReference, ResolveError> {
    let (url, resolution) = media_url(item)?;
    Ok(MediaReference {
        url,
        resolution,
        taken_at: unix_field(post, "taken_at"),
        owner: owner_username(item, post),
        coauthors: coauthor_usernames(post),
        origin_data: post.clone(),
    })
}

/// A batch item: its own fields first, post-level values filling the gaps.
fn decorate_batch_item(item: &Value, post: &Value) -> Result<MediaReference, ResolveError> {
    let (url, resolution) = media_url(item)?;
    Ok(MediaReference {
        url,
        resolution,
        taken_at: unix_field(item, "taken_at").or_else(|| unix_field(post, "taken_at")),
        owner: owner_username(item, post),
        coauthors: coauthor_usernames(item),
        origin_data: item.clone(),
    })
}

/// A single-media post is its own item.
fn decorate_single(post: &Value) -> Result<MediaReference, ResolveError> {
    let (url, resolution) = media_url(post)?;
    Ok(MediaReference {
        url,
        resolution,
        taken_at: unix_field(post, "taken_at"),
        owner: owner_username(post, post),
        coauthors: coauthor_usernames(post),
        origin_data: post.clone(),
    })
}

/// Video version head if present, else the image candidate head.
fn media_url(item: &Value) -> Result<(String, Option<(u32, u32)>), ResolveError> {
    let version = item
        .get("video_versions")
        .and_then(|versions| versions.get(0))
        .or_else(|| {
            item.get("image_versions2")
                .and_then(|iv| iv.get("candidates"))
                .and_then(|candidates| candidates.get(0))
        })
        .ok_or_else(|| ResolveError::malformed("item has neither video nor image versions"))?;

    let url = version
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| ResolveError::malformed("media version has no url"))?
        .to_string();

    let resolution = match (
        version.get("width").and_then(Value::as_u64),
        version.get("height").and_then(Value::as_u64),
    ) {
        (Some(w), Some(h)) => Some((u32::try_from(w).unwrap_or(0), u32::try_from(h).unwrap_or(0))),
        _ => None,
    };
    Ok((url, resolution))
}

fn unix_field(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    value
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn username_of(value: &Value) -> Option<String> {
    value
        .get("username")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// item owner → post owner → post-level `user` (older payloads).
fn owner_username(item: &Value, post: &Value) -> Option<String> {
    item.get("owner")
        .and_then(username_of)
        .or_else(|| post.get("owner").and_then(username_of))
        .or_else(|| post.get("user").and_then(username_of))
}

fn coauthor_usernames(value: &Value) -> Vec<String> {
    value
        .get("coauthor_producers")
        .and_then(Value::as_array)
        .map(|producers| producers.iter().filter_map(username_of).collect())
        .unwrap_or_default()
}
