//! Read-only page model: the ambient location plus a DOM snapshot.
//!
//! The host (button layer, test harness) hands the pipeline a [`Page`]; the
//! pipeline never mutates the tree. The only mutable surface is an ephemeral
//! attribute overlay used to cache a resolved video URL on its element so
//! repeat interactions skip the network.

use std::collections::HashMap;
use std::sync::RwLock;

use url::Url;

/// Maximum ancestor hops for containment checks. Real post markup nests a few
/// dozen levels deep at most; the guard keeps a malformed tree from looping.
pub const MAX_ANCESTOR_DEPTH: usize = 64;

/// Handle into a [`Dom`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct NodeData {
    tag: String,
    attrs: HashMap<String, String>,
    classes: Vec<String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed DOM snapshot. Node 0 is the document root.
#[derive(Debug)]
pub struct Dom {
    nodes: Vec<NodeData>,
    ephemeral: RwLock<HashMap<(NodeId, String), String>>,
}

impl Dom {
    /// Starts building a tree; the builder seeds the root element.
    #[must_use]
    pub fn builder(root_tag: &str) -> DomBuilder {
        DomBuilder {
            nodes: vec![NodeData {
                tag: root_tag.to_ascii_lowercase(),
                attrs: HashMap::new(),
                classes: Vec::new(),
                text: String::new(),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// The document root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Lower-cased tag name.
    #[must_use]
    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    /// Attribute value as authored, if present.
    #[must_use]
    pub fn attr(&self, node: NodeId, key: &str) -> Option<&str> {
        self.nodes[node.0].attrs.get(key).map(String::as_str)
    }

    /// Class list split from the `class` attribute.
    #[must_use]
    pub fn classes(&self, node: NodeId) -> &[String] {
        &self.nodes[node.0].classes
    }

    /// Concatenated text content of the node itself (not descendants).
    #[must_use]
    pub fn text(&self, node: NodeId) -> &str {
        &self.nodes[node.0].text
    }

    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Walks up from `node` (inclusive) looking for the first ancestor that
    /// satisfies `predicate`, giving up after [`MAX_ANCESTOR_DEPTH`] hops.
    pub fn find_ancestor<P>(&self, node: NodeId, predicate: P) -> Option<NodeId>
    where
        P: Fn(&Dom, NodeId) -> bool,
    {
        let mut current = Some(node);
        for _ in 0..MAX_ANCESTOR_DEPTH {
            let id = current?;
            if predicate(self, id) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    /// True when `ancestor` is `node` or lies on its parent chain.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.find_ancestor(node, |_, id| id == ancestor).is_some()
    }

    /// Pre-order traversal of the subtree rooted at `node`, excluding `node`.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// First descendant with the given tag, pre-order.
    #[must_use]
    pub fn find_descendant_by_tag(&self, node: NodeId, tag: &str) -> Option<NodeId> {
        self.descendants(node)
            .into_iter()
            .find(|&id| self.tag(id) == tag)
    }

    /// All descendants with the given tag, pre-order.
    #[must_use]
    pub fn descendants_by_tag(&self, node: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(node)
            .into_iter()
            .filter(|&id| self.tag(id) == tag)
            .collect()
    }

    /// Ephemeral attribute, set during this page session only.
    #[must_use]
    pub fn ephemeral_attr(&self, node: NodeId, key: &str) -> Option<String> {
        self.ephemeral
            .read()
            .ok()
            .and_then(|map| map.get(&(node, key.to_string())).cloned())
    }

    /// Records an ephemeral attribute on `node`. Overlay only; the authored
    /// attributes are never touched.
    pub fn set_ephemeral_attr(&self, node: NodeId, key: &str, value: &str) {
        if let Ok(mut map) = self.ephemeral.write() {
            map.insert((node, key.to_string()), value.to_string());
        }
    }
}

/// Incremental tree construction for hosts and tests.
#[derive(Debug)]
pub struct DomBuilder {
    nodes: Vec<NodeData>,
}

impl DomBuilder {
    /// The root element seeded by [`Dom::builder`].
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Appends a child element under `parent` and returns its id.
    pub fn element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            tag: tag.to_ascii_lowercase(),
            attrs: HashMap::new(),
            classes: Vec::new(),
            text: String::new(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Sets an attribute; `class` also refreshes the parsed class list.
    pub fn attr(&mut self, node: NodeId, key: &str, value: &str) {
        if key == "class" {
            self.nodes[node.0].classes =
                value.split_whitespace().map(ToString::to_string).collect();
        }
        self.nodes[node.0]
            .attrs
            .insert(key.to_string(), value.to_string());
    }

    /// Sets the node's own text content.
    pub fn text(&mut self, node: NodeId, text: &str) {
        self.nodes[node.0].text = text.to_string();
    }

    #[must_use]
    pub fn build(self) -> Dom {
        Dom {
            nodes: self.nodes,
            ephemeral: RwLock::new(HashMap::new()),
        }
    }
}

/// Errors constructing a [`PageLocation`].
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// The page href did not parse as an absolute URL.
    #[error("invalid page href: {href}")]
    InvalidHref {
        /// The offending href string.
        href: String,
    },
}

/// Ambient location of the rendered page (href, path, query).
#[derive(Debug, Clone)]
pub struct PageLocation {
    url: Url,
}

impl PageLocation {
    /// Parses an absolute page href.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::InvalidHref`] when `href` is not an absolute URL.
    pub fn parse(href: &str) -> Result<Self, PageError> {
        let url = Url::parse(href).map_err(|_| PageError::InvalidHref {
            href: href.to_string(),
        })?;
        Ok(Self { url })
    }

    /// Full href as authored.
    #[must_use]
    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    /// Path component, always `/`-prefixed.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Non-empty path segments.
    #[must_use]
    pub fn path_segments(&self) -> Vec<&str> {
        self.url
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect()
    }

    /// First query parameter value for `key`.
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }
}

/// The inbound boundary: one rendered page handed in by the host layer.
#[derive(Debug)]
pub struct Page {
    /// Ambient location (path, query) of the page.
    pub location: PageLocation,
    /// Read-only DOM snapshot.
    pub dom: Dom,
}

impl Page {
    #[must_use]
    pub fn new(location: PageLocation, dom: Dom) -> Self {
        Self { location, dom }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_dom() -> (Dom, NodeId, NodeId) {
        let mut builder = Dom::builder("html");
        let body = builder.element(builder.root(), "body");
        let article = builder.element(body, "article");
        builder.attr(article, "class", "post wide");
        let video = builder.element(article, "video");
        builder.attr(video, "poster", "https://cdn.example/abc.jpg?x=1");
        let dom = builder.build();
        (dom, article, video)
    }

    #[test]
    fn test_find_ancestor_locates_article() {
        let (dom, article, video) = sample_dom();
        let found = dom.find_ancestor(video, |dom, id| dom.tag(id) == "article");
        assert_eq!(found, Some(article));
    }

    #[test]
    fn test_find_ancestor_gives_up_at_root() {
        let (dom, _, video) = sample_dom();
        assert!(
            dom.find_ancestor(video, |dom, id| dom.tag(id) == "section")
                .is_none()
        );
    }

    #[test]
    fn test_contains_checks_parent_chain() {
        let (dom, article, video) = sample_dom();
        assert!(dom.contains(article, video));
        assert!(!dom.contains(video, article));
    }

    #[test]
    fn test_classes_parsed_from_class_attr() {
        let (dom, article, _) = sample_dom();
        assert_eq!(dom.classes(article), ["post", "wide"]);
    }

    #[test]
    fn test_ephemeral_attr_overlay_roundtrip() {
        let (dom, _, video) = sample_dom();
        assert!(dom.ephemeral_attr(video, "videoURL").is_none());
        dom.set_ephemeral_attr(video, "videoURL", "https://host/v.mp4");
        assert_eq!(
            dom.ephemeral_attr(video, "videoURL").as_deref(),
            Some("https://host/v.mp4")
        );
        // The authored attribute table is untouched.
        assert!(dom.attr(video, "videoURL").is_none());
    }

    #[test]
    fn test_descendants_preorder() {
        let (dom, _, _) = sample_dom();
        let tags: Vec<&str> = dom
            .descendants(dom.root())
            .into_iter()
            .map(|id| dom.tag(id))
            .collect();
        assert_eq!(tags, ["body", "article", "video"]);
    }

    #[test]
    fn test_page_location_parses_path_and_query() {
        let loc = PageLocation::parse("https://www.instagram.com/p/XYZ/?img_index=3").unwrap();
        assert_eq!(loc.path(), "/p/XYZ/");
        assert_eq!(loc.path_segments(), ["p", "XYZ"]);
        assert_eq!(loc.query_param("img_index").as_deref(), Some("3"));
        assert!(loc.query_param("missing").is_none());
    }

    #[test]
    fn test_page_location_rejects_relative_href() {
        assert!(PageLocation::parse("/p/XYZ/").is_err());
    }
}
