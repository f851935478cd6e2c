//! Context locator: classifies the triggering interaction and derives the
//! post/media identity from the page.
//!
//! The classifier replaces ambient URL branching with one tagged variant
//! decided per flow; the flow dispatches on it through an explicit handler
//! table. Post ids come from the URL path for reels/stories, otherwise from
//! permalink anchors under the post container.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::page::{NodeId, Page};
use crate::util::{STORY_MEDIA_ID_RE, compile_static_regex};

static POST_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"^/p/([^/]+)/"));

/// Errors locating the post context.
#[derive(Debug, Error)]
pub enum LocatorError {
    /// No post container encloses the clicked control.
    #[error("no post container found for the clicked control")]
    NoContainer,

    /// The page and container yielded no post identifier.
    #[error("no post id found in page path or container anchors")]
    PostIdNotFound,
}

/// The surface the clicked control belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// A feed post (or a post dialog overlaying another page).
    Post,
    /// A post opened on its own detail page.
    PostDetail,
    /// The profile header region.
    Profile,
    /// A reel surface (`/reels/` feed or `/reel/` detail).
    Reel,
    /// An ongoing story.
    Story,
    /// A story highlight.
    Highlight,
}

/// Identity of the post/media the interaction targets.
#[derive(Debug, Clone)]
pub struct PostContext {
    /// Shortcode-style post identifier.
    pub post_id: String,
    /// Numeric media id when the URL already embeds one (story URLs).
    pub media_id: Option<String>,
    /// Whether the post holds a swipeable media sequence.
    pub is_carousel: bool,
    /// Active carousel position, 0 for single-media posts.
    pub media_index: usize,
}

/// Classifies the interaction from URL path prefixes and DOM containment.
#[must_use]
pub fn classify(page: &Page, control: NodeId) -> Interaction {
    if in_profile_header(page, control) {
        return Interaction::Profile;
    }

    let path = page.location.path();
    if path.starts_with("/reels/") {
        return Interaction::Reel;
    }
    if path.starts_with("/stories/highlights/") {
        return Interaction::Highlight;
    }
    if path.starts_with("/stories/") {
        return Interaction::Story;
    }
    if path.starts_with("/reel/") {
        return Interaction::Reel;
    }
    if path.starts_with("/p/") {
        // A dialog overlay means the post was opened from a feed/profile grid.
        return if in_dialog(page, control) {
            Interaction::Post
        } else {
            Interaction::PostDetail
        };
    }

    let segments = page.location.path_segments();
    if segments.len() == 3 && (segments[1] == "p" || segments[1] == "reel") {
        return Interaction::PostDetail;
    }

    Interaction::Post
}

/// Locates the enclosing post container and derives the [`PostContext`].
///
/// # Errors
///
/// Returns [`LocatorError`] when no container encloses the control or no
/// post id is discoverable.
pub fn locate(page: &Page, control: NodeId) -> Result<(NodeId, PostContext), LocatorError> {
    let container = find_post_container(page, control).ok_or(LocatorError::NoContainer)?;
    let post_id = find_post_id(page, container).ok_or(LocatorError::PostIdNotFound)?;
    let media_id = STORY_MEDIA_ID_RE
        .captures(page.location.href())
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()));
    let is_carousel = has_media_list(page, container);
    let media_index = if is_carousel {
        carousel_index(page, container)
    } else {
        0
    };

    debug!(
        post_id = %post_id,
        is_carousel,
        media_index,
        "located post context"
    );

    Ok((
        container,
        PostContext {
            post_id,
            media_id,
            is_carousel,
            media_index,
        },
    ))
}

/// The enclosing `article`, else the page's `main` region.
#[must_use]
pub fn find_post_container(page: &Page, control: NodeId) -> Option<NodeId> {
    let dom = &page.dom;
    dom.find_ancestor(control, |dom, id| dom.tag(id) == "article")
        .or_else(|| dom.find_descendant_by_tag(dom.root(), "main"))
}

/// Extracts the post id from the path, else from anchors under `container`.
#[must_use]
pub fn find_post_id(page: &Page, container: NodeId) -> Option<String> {
    let segments = page.location.path_segments();
    let path = page.location.path();
    if path.starts_with("/p/") || path.starts_with("/reels/") || path.starts_with("/reel/") {
        return segments.get(1).map(ToString::to_string);
    }
    if path.starts_with("/stories/") {
        return segments.get(2).map(ToString::to_string);
    }
    if segments.len() == 3 && (segments[1] == "p" || segments[1] == "reel") {
        return segments.get(2).map(ToString::to_string);
    }

    for anchor in page.dom.descendants_by_tag(container, "a") {
        if let Some(href) = page.dom.attr(anchor, "href")
            && let Some(caps) = POST_ID_RE.captures(href)
            && let Some(id) = caps.get(1)
        {
            return Some(id.as_str().to_string());
        }
    }
    None
}

/// Active carousel position: the indicator dot carrying the two-class
/// signature, else the 1-based `img_index` query parameter, else 0.
#[must_use]
pub fn carousel_index(page: &Page, container: NodeId) -> usize {
    if let Some(index) = indicator_dot_index(page, container) {
        return index;
    }
    page.location
        .query_param("img_index")
        .and_then(|raw| raw.parse::<usize>().ok())
        .map_or(0, |one_based| one_based.saturating_sub(1))
}

/// Scans for a sibling group of indicator dots: all `div`s with classes,
/// exactly one bearing two classes (the active dot).
fn indicator_dot_index(page: &Page, container: NodeId) -> Option<usize> {
    let dom = &page.dom;
    for candidate in dom.descendants(container) {
        let dots = dom.children(candidate);
        if dots.len() < 2 {
            continue;
        }
        let is_dot_group = dots
            .iter()
            .all(|&dot| dom.tag(dot) == "div" && !dom.classes(dot).is_empty());
        if !is_dot_group {
            continue;
        }
        let active: Vec<usize> = dots
            .iter()
            .enumerate()
            .filter(|&(_, &dot)| dom.classes(dot).len() == 2)
            .map(|(position, _)| position)
            .collect();
        if active.len() == 1 {
            return Some(active[0]);
        }
    }
    None
}

/// Whether the container shows a carousel media list (`li` items carrying
/// both inline style and class markers).
fn has_media_list(page: &Page, container: NodeId) -> bool {
    page.dom
        .descendants_by_tag(container, "li")
        .into_iter()
        .any(|li| page.dom.attr(li, "style").is_some() && page.dom.attr(li, "class").is_some())
}

fn in_profile_header(page: &Page, control: NodeId) -> bool {
    page.dom
        .find_ancestor(control, |dom, id| dom.tag(id) == "header")
        .is_some()
}

fn in_dialog(page: &Page, control: NodeId) -> bool {
    page.dom
        .find_ancestor(control, |dom, id| dom.attr(id, "role") == Some("dialog"))
        .is_some()
}
