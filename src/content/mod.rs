//! Content module - front matter, loading, and body transformation

mod document;
mod error;
mod frontmatter;
pub mod loader;
mod markdown;
mod post;
pub mod shortcode;

pub use document::{Align, Callout, Document, Node, MORE_MARKER};
pub use error::ContentError;
pub use frontmatter::{FrontMatter, MetadataError, RECOGNIZED_KEYS};
pub use loader::ContentLoader;
pub use markdown::{MarkdownTransformer, TransformError, DEFAULT_CALLOUTS};
pub use post::{is_external, AssetKind, AssetRef, Post, Variant};
