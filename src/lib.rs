//! Media-grab core library.
//!
//! Turns an in-page interaction (a click on an injected download control)
//! into a saved-media artifact: locate the post, resolve its media through
//! the structured metadata endpoint or a DOM scrape fallback, format a
//! deterministic filename, fetch the bytes, and emit a file, reference, or
//! zipped batch archive for the host layer to save.
//!
//! # Architecture
//!
//! - [`page`] - page snapshot model (DOM arena, location) at the inbound
//!   boundary
//! - [`locator`] - interaction classification and post-container location
//! - [`resolve`] - media resolution strategies and the per-session caches
//! - [`normalize`] - canonical media-host rewriting for video URLs
//! - [`format`] - deterministic filename formatting
//! - [`download`] - fetching and single/batch artifact assembly
//! - [`flow`] - the end-to-end pipeline tying the stages together
//! - [`settings`] - the configuration snapshot handed in per flow

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod flow;
pub mod format;
pub mod locator;
pub mod normalize;
pub mod page;
pub mod resolve;
pub mod settings;
pub mod util;

// Re-export commonly used types
pub use download::{Artifact, DownloadError, DownloadRequest};
pub use flow::{Flow, FlowError, FlowStage};
pub use locator::{Interaction, LocatorError, PostContext, classify, locate};
pub use page::{Dom, DomBuilder, NodeId, Page, PageError, PageLocation};
pub use resolve::{
    ApiResolver, DomFallbackResolver, MediaReference, MediaResolver, Resolved, ResolveError,
    Session,
};
pub use settings::Settings;
